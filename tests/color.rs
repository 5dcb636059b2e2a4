mod tests {
    use metro_light_composer::color::{BLACK, Rgb, WHITE, dim, from_array, rgb_from_u32, to_array};

    const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };

    #[test]
    fn test_rgb_from_u32() {
        assert_eq!(rgb_from_u32(0xFF0000), RED);
        assert_eq!(
            rgb_from_u32(0x12_34_56),
            Rgb {
                r: 0x12,
                g: 0x34,
                b: 0x56
            }
        );
        assert_eq!(WHITE, Rgb::new(255, 255, 255));
    }

    #[test]
    fn test_dim() {
        assert_eq!(dim(RED, 1.0), RED);
        assert_eq!(dim(RED, 0.0), BLACK);
        assert_eq!(dim(RED, 0.5), Rgb { r: 128, g: 0, b: 0 });
        // Out-of-range brightness is clamped
        assert_eq!(dim(WHITE, 2.0), WHITE);
        assert_eq!(dim(WHITE, -1.0), BLACK);
    }

    #[test]
    fn test_array_conversion() {
        assert_eq!(to_array(Rgb::new(1, 2, 3)), [1, 2, 3]);
        assert_eq!(from_array([255, 165, 0]), Rgb::new(255, 165, 0));
    }
}

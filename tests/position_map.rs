mod tests {
    use metro_light_composer::error::ConfigError;
    use metro_light_composer::position_map::PositionMap;

    fn three_stops() -> PositionMap {
        PositionMap::new([("A03", 0), ("A02", 1), ("A01", 2)], None).unwrap()
    }

    #[test]
    fn test_lookup_both_ways() {
        let map = three_stops();
        assert_eq!(map.count(), 3);
        assert_eq!(map.len(), 3);
        assert_eq!(map.position_of("A02"), Some(1));
        assert_eq!(map.stop_at(2), Some("A01"));
        assert_eq!(map.position_of("Z99"), None);
        assert_eq!(map.stop_at(3), None);
    }

    #[test]
    fn test_explicit_count_leaves_unmapped_positions() {
        let map = PositionMap::new([("A01", 0), ("A02", 4)], Some(6)).unwrap();
        assert_eq!(map.count(), 6);
        assert!(map.contains(5));
        assert!(!map.contains(6));
        assert_eq!(map.stop_at(2), None);
    }

    #[test]
    fn test_neighbors_prefer_next_position() {
        let map = three_stops();
        assert_eq!(map.neighbors(1).as_slice(), &[2, 0]);
        assert_eq!(map.neighbors(0).as_slice(), &[1]);
        assert_eq!(map.neighbors(2).as_slice(), &[1]);
    }

    #[test]
    fn test_iter_is_ordered_by_position() {
        let map = PositionMap::new([("C", 2), ("A", 0), ("B", 1)], None).unwrap();
        let order: Vec<(&str, usize)> = map.iter().collect();
        assert_eq!(order, vec![("A", 0), ("B", 1), ("C", 2)]);
    }

    #[test]
    fn test_rejects_duplicate_position() {
        let err = PositionMap::new([("A01", 3), ("A02", 3)], None).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePosition { position: 3, .. }));
    }

    #[test]
    fn test_rejects_duplicate_stop() {
        let err = PositionMap::new([("A01", 0), ("A01", 1)], None).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateStop(stop) if stop == "A01"));
    }

    #[test]
    fn test_rejects_zero_positions() {
        let empty: [(&str, usize); 0] = [];
        assert!(matches!(
            PositionMap::new(empty, None),
            Err(ConfigError::ZeroPositions)
        ));
        assert!(matches!(
            PositionMap::new([("A01", 0)], Some(0)),
            Err(ConfigError::ZeroPositions)
        ));
    }

    #[test]
    fn test_rejects_position_outside_strip() {
        let err = PositionMap::new([("A01", 5)], Some(5)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::PositionOutOfRange {
                position: 5,
                count: 5,
                ..
            }
        ));
    }
}

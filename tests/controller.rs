mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration as StdDuration, Instant as StdInstant};

    use embassy_time::Duration;
    use metro_light_composer::color::Rgb;
    use metro_light_composer::config::Config;
    use metro_light_composer::controller::{
        Controller, LedOverride, LoopSettings, Mode, OverrideStatus, StartStatus, StopStatus,
    };
    use metro_light_composer::error::{ControlError, FetchError, SinkError};
    use metro_light_composer::frame::PixelKind;
    use metro_light_composer::occupancy::{BoardingEvent, BoardingStatus};
    use metro_light_composer::palette::LinePalette;
    use metro_light_composer::position_map::PositionMap;
    use metro_light_composer::position_map::Position;
    use metro_light_composer::sink::{DisplaySink, LedMode, SimulatedSink};
    use metro_light_composer::source::PredictionSource;

    const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };

    /// Reports a train boarding at A01, or always fails
    struct FixedSource {
        fail: bool,
    }

    impl PredictionSource for FixedSource {
        fn fetch_boarding_events(&self) -> Result<Vec<BoardingEvent>, FetchError> {
            if self.fail {
                return Err(FetchError::transport("connection refused"));
            }
            Ok(vec![BoardingEvent::new("A01", "RD", BoardingStatus::Boarding)])
        }
    }

    /// Panics on the first `panics` fetches, then behaves like a healthy [`FixedSource`]
    struct PanickingSource {
        panics: usize,
        calls: AtomicUsize,
    }

    impl PredictionSource for PanickingSource {
        fn fetch_boarding_events(&self) -> Result<Vec<BoardingEvent>, FetchError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.panics {
                panic!("prediction feed exploded");
            }
            FixedSource { fail: false }.fetch_boarding_events()
        }
    }

    /// Takes longer than the stop timeout to answer
    struct SlowSource;

    impl PredictionSource for SlowSource {
        fn fetch_boarding_events(&self) -> Result<Vec<BoardingEvent>, FetchError> {
            thread::sleep(StdDuration::from_millis(1500));
            FixedSource { fail: false }.fetch_boarding_events()
        }
    }

    /// Simulated strip with one position that refuses writes
    struct BrokenPixelSink {
        inner: SimulatedSink,
        broken: Position,
    }

    impl DisplaySink for BrokenPixelSink {
        fn set_pixel(&mut self, position: Position, color: Rgb, brightness: f32) -> Result<(), SinkError> {
            if position == self.broken {
                return Err(SinkError::Write {
                    position,
                    message: "stuck pixel".to_owned(),
                });
            }
            self.inner.set_pixel(position, color, brightness)
        }

        fn clear(&mut self) -> Result<(), SinkError> {
            self.inner.clear()
        }

        fn flush(&mut self) -> Result<(), SinkError> {
            self.inner.flush()
        }

        fn is_ready(&self) -> bool {
            self.inner.is_ready()
        }
    }

    fn controller(fail: bool, sink: SimulatedSink) -> Controller<FixedSource, SimulatedSink> {
        controller_with(FixedSource { fail }, sink)
    }

    fn controller_with<S, D>(source: S, sink: D) -> Controller<S, D>
    where
        S: PredictionSource + 'static,
        D: DisplaySink + Send + 'static,
    {
        let positions = PositionMap::new([("A01", 0), ("A02", 1), ("A03", 2)], Some(4)).unwrap();
        let palette = LinePalette::new([("RD", RED)]);
        let settings = LoopSettings {
            frame_duration: Duration::from_millis(20),
            ..LoopSettings::default()
        };
        Controller::new(
            Arc::new(source),
            sink,
            Arc::new(positions),
            Arc::new(palette),
            settings,
        )
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = StdInstant::now() + StdDuration::from_secs(5);
        while StdInstant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(StdDuration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_start_is_idempotent() {
        let controller = controller(false, SimulatedSink::new(4));
        assert_eq!(controller.start().unwrap(), StartStatus::Started);
        assert_eq!(controller.start().unwrap(), StartStatus::AlreadyRunning);
        assert!(controller.is_running());
        assert_eq!(controller.stop(), StopStatus::Stopped);
        assert!(!controller.is_running());
    }

    #[test]
    fn test_stop_when_not_running_matches_real_stop() {
        let controller = controller(false, SimulatedSink::new(4));
        assert_eq!(controller.stop(), StopStatus::Stopped);
        assert_eq!(controller.stop(), StopStatus::Stopped);
        assert!(controller.led_status().is_empty());
    }

    #[test]
    fn test_worker_publishes_frames_for_polling() {
        let controller = controller(false, SimulatedSink::new(4));
        controller.start().unwrap();

        assert!(wait_until(|| !controller.led_status().is_empty()));
        let leds = controller.led_status();
        assert_eq!(leds[0].position, 0);
        assert_eq!(leds[0].color, [255, 0, 0]);
        assert_eq!(leds[0].brightness, 1.0);
        assert_eq!(leds[0].kind, PixelKind::Solid);
        assert!(wait_until(|| controller.with_sink(|sink| sink.shown(0).is_some())));

        let status = controller.status();
        assert!(status.running);
        assert_eq!(status.mode, Mode::Healthy);
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.seconds_since_success.is_some());

        controller.stop();
    }

    #[test]
    fn test_stop_clears_strip_and_published_frame() {
        let controller = controller(false, SimulatedSink::new(4));
        controller.start().unwrap();
        assert!(wait_until(|| controller.with_sink(|sink| sink.lit() > 0)));

        controller.stop();
        assert!(controller.led_status().is_empty());
        assert!(controller.frame().is_empty());
        assert_eq!(controller.with_sink(SimulatedSink::lit), 0);

        // Nothing is written after stop returns
        let flushes = controller.with_sink(SimulatedSink::flush_count);
        thread::sleep(StdDuration::from_millis(100));
        assert_eq!(controller.with_sink(SimulatedSink::flush_count), flushes);
    }

    #[test]
    fn test_restart_after_stop() {
        let controller = controller(false, SimulatedSink::new(4));
        controller.start().unwrap();
        controller.stop();
        assert_eq!(controller.start().unwrap(), StartStatus::Started);
        assert!(wait_until(|| !controller.led_status().is_empty()));
        controller.stop();
    }

    #[test]
    fn test_fetch_failures_degrade_mode() {
        let controller = controller(true, SimulatedSink::new(4));
        assert_eq!(controller.status().mode, Mode::Healthy);

        controller.start().unwrap();
        assert!(wait_until(|| controller.status().consecutive_failures >= 1));
        let status = controller.status();
        assert_eq!(status.mode, Mode::Degraded);
        assert_eq!(status.seconds_since_success, None);
        assert!(controller.led_status().is_empty());
        controller.stop();
    }

    #[test]
    fn test_sink_not_ready_is_structured_error() {
        let controller = controller(false, SimulatedSink::new(4).not_ready());
        let err = controller.start().unwrap_err();
        assert!(matches!(err, ControlError::SinkNotReady));
        assert!(!controller.is_running());

        let response = controller.error_response(&err);
        assert_eq!(response.status, "error");
        assert_eq!(response.message, "LED controller not initialized");
        assert_eq!(response.led_mode, LedMode::Simulated);

        let overrides = [LedOverride {
            position: 0,
            color: [0, 255, 0],
            brightness: 1.0,
        }];
        assert!(matches!(
            controller.set_leds(&overrides),
            Err(ControlError::SinkNotReady)
        ));
    }

    #[test]
    fn test_manual_override() {
        let controller = controller(false, SimulatedSink::new(4));
        let overrides = [
            LedOverride {
                position: 1,
                color: [0, 255, 0],
                brightness: 3.0,
            },
            LedOverride {
                position: 99,
                color: [0, 0, 255],
                brightness: 1.0,
            },
        ];
        assert_eq!(controller.set_leds(&overrides).unwrap(), OverrideStatus::Success);

        let shown = controller.with_sink(|sink| sink.shown(1)).unwrap();
        assert_eq!(shown.color, Rgb::new(0, 255, 0));
        assert_eq!(shown.brightness, 1.0);

        let leds = controller.led_status();
        assert_eq!(leds.len(), 1);
        assert_eq!(leds[0].kind, PixelKind::Manual);
        assert_eq!(leds[0].brightness, 1.0);
    }

    #[test]
    fn test_override_accepts_index_alias() {
        let led: LedOverride = serde_json::from_str(r#"{"index": 3, "color": [1, 2, 3]}"#).unwrap();
        assert_eq!(led.position, 3);
        assert_eq!(led.brightness, 1.0);
    }

    #[test]
    fn test_stations_from_config() {
        let config = Config::default();
        let controller = Controller::from_config(
            &config,
            Arc::new(FixedSource { fail: false }),
            SimulatedSink::new(27),
        )
        .unwrap();

        let stations = controller.stations();
        assert_eq!(stations.len(), 27);
        assert_eq!(stations[0].code, "A15");
        assert_eq!(stations[0].position, 0);
        assert_eq!(stations[0].name, "Shady Grove");
        assert_eq!(stations[26].code, "B12");
        assert!(controller.palette().is_known("RD"));
        assert_eq!(controller.led_mode(), LedMode::Simulated);
    }

    #[test]
    fn test_health_includes_status() {
        let controller = controller(false, SimulatedSink::new(4));
        let health = controller.health();
        assert!(!health.status.running);
        assert!(health.status.sink_ready);

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["running"], false);
        assert_eq!(json["led_mode"], "simulated");
        assert_eq!(json["mode"], "healthy");
    }

    #[test]
    fn test_worker_survives_panicking_iteration() {
        let controller = controller_with(
            PanickingSource {
                panics: 1,
                calls: AtomicUsize::new(0),
            },
            SimulatedSink::new(4),
        );
        controller.start().unwrap();

        assert!(wait_until(|| !controller.led_status().is_empty()));
        assert!(controller.is_running());
        assert!(wait_until(|| controller.with_sink(|sink| sink.shown(0).is_some())));
        assert!(wait_until(|| controller.status().mode == Mode::Healthy));
        controller.stop();
    }

    #[test]
    fn test_repeated_panics_degrade_mode() {
        let controller = controller_with(
            PanickingSource {
                panics: usize::MAX,
                calls: AtomicUsize::new(0),
            },
            SimulatedSink::new(4),
        );
        controller.start().unwrap();

        assert!(wait_until(|| controller.status().mode == Mode::Degraded));
        thread::sleep(StdDuration::from_millis(100));
        let status = controller.status();
        assert!(status.running);
        assert_eq!(status.mode, Mode::Degraded);
        assert!(controller.led_status().is_empty());
        assert_eq!(controller.stop(), StopStatus::Stopped);
        assert!(!controller.is_running());
    }

    #[test]
    fn test_override_batch_continues_past_failed_write() {
        let sink = BrokenPixelSink {
            inner: SimulatedSink::new(4),
            broken: 1,
        };
        let controller = controller_with(FixedSource { fail: false }, sink);
        let overrides = [
            LedOverride {
                position: 1,
                color: [0, 255, 0],
                brightness: 1.0,
            },
            LedOverride {
                position: 2,
                color: [0, 0, 255],
                brightness: 0.5,
            },
        ];

        let err = controller.set_leds(&overrides).unwrap_err();
        assert!(matches!(err, ControlError::Sink(SinkError::Write { position: 1, .. })));

        // The write after the failure still reaches the strip
        let shown = controller.with_sink(|sink| sink.inner.shown(2)).unwrap();
        assert_eq!(shown.color, Rgb::new(0, 0, 255));
        assert_eq!(shown.brightness, 0.5);
        assert!(controller.with_sink(|sink| sink.inner.shown(1)).is_none());
        assert_eq!(controller.with_sink(|sink| sink.inner.flush_count()), 1);

        let leds = controller.led_status();
        assert_eq!(leds.len(), 1);
        assert_eq!(leds[0].position, 2);
        assert_eq!(leds[0].kind, PixelKind::Manual);
    }

    #[test]
    fn test_stop_detaches_slow_worker_without_further_writes() {
        let controller = controller_with(SlowSource, SimulatedSink::new(4));
        controller.start().unwrap();
        thread::sleep(StdDuration::from_millis(50));

        assert_eq!(controller.stop(), StopStatus::Stopped);
        assert!(!controller.is_running());
        assert!(controller.status().lingering_worker);
        let flushes = controller.with_sink(SimulatedSink::flush_count);

        assert!(wait_until(|| !controller.status().lingering_worker));
        assert_eq!(controller.with_sink(SimulatedSink::flush_count), flushes);
        assert_eq!(controller.with_sink(SimulatedSink::lit), 0);
        assert!(controller.led_status().is_empty());
    }
}

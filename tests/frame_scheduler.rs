mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use embassy_time::{Duration, Instant};
    use metro_light_composer::color::Rgb;
    use metro_light_composer::error::FetchError;
    use metro_light_composer::fetcher::{FetchOutcome, FetchPolicy, SnapshotFetcher};
    use metro_light_composer::frame::PixelKind;
    use metro_light_composer::frame_scheduler::FrameScheduler;
    use metro_light_composer::occupancy::{BoardingEvent, BoardingStatus};
    use metro_light_composer::palette::LinePalette;
    use metro_light_composer::position_map::PositionMap;
    use metro_light_composer::renderer::{RenderTimings, Renderer, Tick};
    use metro_light_composer::sink::SimulatedSink;
    use metro_light_composer::source::PredictionSource;

    const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };

    #[derive(Default)]
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Vec<BoardingEvent>, FetchError>>>,
    }

    impl PredictionSource for ScriptedSource {
        fn fetch_boarding_events(&self) -> Result<Vec<BoardingEvent>, FetchError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchError::Status(503)))
        }
    }

    fn scheduler(responses: Vec<Result<Vec<BoardingEvent>, FetchError>>) -> FrameScheduler<ScriptedSource> {
        let source = Arc::new(ScriptedSource {
            script: Mutex::new(responses.into()),
        });
        let palette = Arc::new(LinePalette::new([("RD", RED)]));
        let positions = Arc::new(PositionMap::new([("A01", 0), ("A02", 1), ("A03", 2)], None).unwrap());
        let fetcher = SnapshotFetcher::new(
            source,
            Arc::clone(&palette),
            FetchPolicy::default(),
            Instant::from_secs(0),
        );
        FrameScheduler::new(fetcher, Renderer::new(positions, palette, RenderTimings::default()))
    }

    fn at(secs: u64) -> Tick {
        Tick::new(Instant::from_secs(secs), secs)
    }

    fn boarding_at_a01() -> Vec<BoardingEvent> {
        vec![BoardingEvent::new("A01", "RD", BoardingStatus::Boarding)]
    }

    #[test]
    fn test_tick_fetches_renders_and_pushes() {
        let mut scheduler = scheduler(vec![Ok(boarding_at_a01())]);
        let mut sink = SimulatedSink::new(3);

        let result = scheduler.tick(at(0), &mut sink);
        assert_eq!(result.fetch, FetchOutcome::Refreshed { boarding_stops: 1 });
        assert!(result.push.is_clean());
        assert_eq!(result.frame.get(0).unwrap().kind, PixelKind::Solid);
        assert_eq!(sink.shown(0).unwrap().color, RED);
        assert_eq!(sink.flush_count(), 1);
    }

    #[test]
    fn test_fetch_cadence_is_decoupled_from_render() {
        let mut scheduler = scheduler(vec![Ok(boarding_at_a01())]);
        let mut sink = SimulatedSink::new(3);

        scheduler.tick(at(0), &mut sink);
        for secs in 1..10 {
            let result = scheduler.tick(at(secs), &mut sink);
            assert_eq!(result.fetch, FetchOutcome::NotDue);
            assert!(result.frame.is_set(0));
        }
        assert_eq!(sink.flush_count(), 10);
    }

    #[test]
    fn test_failed_fetch_keeps_rendering_stale_snapshot() {
        let mut scheduler = scheduler(vec![Ok(boarding_at_a01())]);
        let mut sink = SimulatedSink::new(3);

        scheduler.tick(at(0), &mut sink);
        let result = scheduler.tick(at(10), &mut sink);
        assert!(matches!(result.fetch, FetchOutcome::Failed { failures: 1, .. }));
        assert_eq!(result.frame.get(0).unwrap().kind, PixelKind::Solid);
        assert_eq!(scheduler.fetcher().consecutive_failures(), 1);
        assert_eq!(scheduler.fetcher().next_fetch_at(), Instant::from_secs(40));
    }

    #[test]
    fn test_render_state_carries_across_ticks() {
        let mut scheduler = scheduler(vec![Ok(boarding_at_a01()), Ok(vec![])]);
        let mut sink = SimulatedSink::new(3);

        scheduler.tick(at(0), &mut sink);
        let result = scheduler.tick(at(10), &mut sink);
        assert_eq!(result.frame.get(0).unwrap().kind, PixelKind::Fade);
        assert!(scheduler.state().is_fading("A01"));
    }

    #[test]
    fn test_schedule_next_keeps_cadence() {
        let mut scheduler = scheduler(vec![]);
        assert_eq!(scheduler.frame_duration(), Duration::from_millis(1000));

        let (deadline, sleep) = scheduler.schedule_next(Instant::from_millis(0));
        assert_eq!(deadline, Instant::from_millis(1000));
        assert_eq!(sleep, Duration::from_millis(1000));

        // Work took 200ms: sleep only the remainder
        let (deadline, sleep) = scheduler.schedule_next(Instant::from_millis(1200));
        assert_eq!(deadline, Instant::from_millis(2000));
        assert_eq!(sleep, Duration::from_millis(800));

        // Slightly late: no sleep, no reset
        let (deadline, sleep) = scheduler.schedule_next(Instant::from_millis(3500));
        assert_eq!(deadline, Instant::from_millis(3000));
        assert_eq!(sleep, Duration::from_millis(0));
    }

    #[test]
    fn test_schedule_next_resets_after_long_stall() {
        let mut scheduler = scheduler(vec![]);
        scheduler.schedule_next(Instant::from_millis(0));

        let (deadline, sleep) = scheduler.schedule_next(Instant::from_millis(60_000));
        assert_eq!(deadline, Instant::from_millis(61_000));
        assert_eq!(sleep, Duration::from_millis(1000));
    }

    #[test]
    fn test_tick_with_pushes_through_acquired_sink() {
        let mut scheduler = scheduler(vec![Ok(boarding_at_a01())]);
        let sink = Mutex::new(SimulatedSink::new(3));

        let result = scheduler
            .tick_with(at(0), || Some(sink.lock().unwrap()))
            .unwrap();
        assert_eq!(result.fetch, FetchOutcome::Refreshed { boarding_stops: 1 });
        assert!(result.push.is_clean());
        assert_eq!(result.next_deadline, Instant::from_millis(1000));

        let sink = sink.lock().unwrap();
        assert_eq!(sink.shown(0).unwrap().color, RED);
        assert_eq!(sink.flush_count(), 1);
    }

    #[test]
    fn test_tick_with_declined_sink_skips_push_and_schedule() {
        let mut scheduler = scheduler(vec![Ok(boarding_at_a01())]);
        let mut sink = SimulatedSink::new(3);

        assert!(scheduler.tick_with(at(0), || None::<&mut SimulatedSink>).is_none());
        assert_eq!(sink.flush_count(), 0);
        assert_eq!(scheduler.fetcher().snapshot().len(), 1);

        // The deadline was not advanced by the declined tick
        let result = scheduler.tick_with(at(0), || Some(&mut sink)).unwrap();
        assert_eq!(result.next_deadline, Instant::from_millis(1000));
        assert_eq!(sink.flush_count(), 1);
    }
}

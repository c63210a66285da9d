//! Integration tests for the encode session pipeline
//!
//! Runs whole streams through `EncodeSession` with synthetic psychoacoustic
//! and quantizer stages and checks the stream-level accounting.

use l3_reservoir::*;
use proptest::prelude::*;

fn valid_config() -> impl Strategy<Value = SessionConfig> {
    prop::sample::select(vec![
        (Channels::Stereo, 44100u32, 128u32),
        (Channels::Stereo, 48000, 320),
        (Channels::Mono, 32000, 32),
        (Channels::Stereo, 32000, 56),
        (Channels::Mono, 22050, 64),
        (Channels::Stereo, 24000, 160),
        (Channels::Mono, 8000, 8),
        (Channels::Stereo, 11025, 64),
    ])
    .prop_map(|(channels, sample_rate, bitrate)| SessionConfig::new(channels, sample_rate, bitrate))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn property_stream_conserves_bits(
        config in valid_config(),
        entropies in prop::collection::vec(0.0f64..3000.0, 1..64),
        fill in prop::collection::vec(0u32..=100, 1..64),
        frames in 1usize..120,
    ) {
        let channels: usize = config.channels.into();
        let limit = config.reservoir_limit();
        let mut session = EncodeSession::new(config).unwrap();

        let mut pe_source = entropies.iter().copied().cycle();
        let mut fill_source = fill.iter().copied().cycle();
        let mut psy = |_gr: usize, _ch: usize| pe_source.next().unwrap_or(0.0);
        let mut quantizer = |_gr: usize, _ch: usize, max_bits: i32| {
            max_bits as u32 * fill_source.next().unwrap_or(100) / 100
        };

        let mut nominal: i64 = 0;
        let mut emitted: i64 = 0;
        for _ in 0..frames {
            let outcome = session.encode_frame(&mut psy, &mut quantizer);
            let cells = (outcome.frame.granules * channels) as i64;

            nominal += outcome.frame.mean_bits_per_channel() as i64 * cells;
            nominal += outcome.stuffing.parity as i64;
            emitted += outcome.side_info.total_part2_3_length() as i64;
            emitted += outcome.side_info.resv_drain as i64;

            for row in outcome.max_bits.iter() {
                for &max_bits in row.iter() {
                    prop_assert!((0..=4095).contains(&max_bits));
                }
            }
            prop_assert!(session.controller().capacity() <= limit);
            prop_assert!(session.controller().occupancy() >= 0);
            prop_assert_eq!(session.controller().occupancy() % 8, 0);
            prop_assert_eq!(
                outcome.next_main_data_begin as i32 * 8,
                session.controller().occupancy()
            );
        }

        prop_assert_eq!(nominal, emitted + session.controller().occupancy() as i64,
            "every nominal bit is either emitted or still banked");
        prop_assert_eq!(session.controller().consistency_mismatches(), 0);
    }
}

#[test]
fn test_quiet_stream_fills_reservoir_then_stuffs() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut session = EncodeSession::new(SessionConfig::new(Channels::Stereo, 44100, 128)).unwrap();
    let mut psy = |_gr: usize, _ch: usize| 10.0;
    let mut quantizer = |_gr: usize, _ch: usize, _max_bits: i32| 200u32;

    let mut stuffed_frames = 0;
    for _ in 0..20 {
        let outcome = session.encode_frame(&mut psy, &mut quantizer);
        if outcome.stuffing.overflow > 0 {
            stuffed_frames += 1;
            assert_eq!(outcome.stuffing.plan, StuffingPlan::FirstGranule);
            assert!(outcome.side_info.part2_3_length(0, 0) > 200);
        }
    }

    assert!(stuffed_frames > 0, "a quiet stream must eventually overflow");
    assert_eq!(session.controller().occupancy(), 4088);
}

#[test]
fn test_demanding_granules_borrow_from_quiet_ones() {
    let mut session = EncodeSession::new(SessionConfig::new(Channels::Mono, 48000, 64)).unwrap();
    // granule 0 is quiet and banks bits, granule 1 is a transient
    let mut psy = |gr: usize, _ch: usize| if gr == 0 { 0.0 } else { 1500.0 };
    let mut quantizer = |gr: usize, _ch: usize, max_bits: i32| {
        if gr == 0 {
            (max_bits / 2) as u32
        } else {
            max_bits as u32
        }
    };

    let first = session.encode_frame(&mut psy, &mut quantizer);
    let nominal = first.frame.mean_bits_per_channel();
    assert_eq!(first.max_bits[0][0], nominal);
    assert!(first.max_bits[1][0] > nominal, "transient granule should get a bonus");

    let second = session.encode_frame(&mut psy, &mut quantizer);
    assert!(second.max_bits[1][0] > nominal);
    assert_eq!(second.frame.main_data_begin, first.next_main_data_begin);
}

#[test]
fn test_session_rejects_unsupported_configuration() {
    match EncodeSession::new(SessionConfig::new(Channels::Stereo, 44100, 8)) {
        Err(ReservoirError::Config(ConfigError::IncompatibleRateCombination { sample_rate, bitrate })) => {
            assert_eq!(sample_rate, 44100);
            assert_eq!(bitrate, 8);
        }
        other => panic!("expected rate combination error, got {:?}", other.map(|_| ())),
    }
}

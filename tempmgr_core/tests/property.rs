//! Property tests over conversion, soft PWM and fault priority.

use proptest::prelude::*;

use tempmgr_core::fault::{FaultKind, FaultSource, FaultWord};
use tempmgr_core::mocks::{CountingPin, NullBeeper, RecordingPwm};
use tempmgr_core::pwm::{FanDrive, Outputs, SoftPwm};
use tempmgr_core::table::{default_bed_table, default_hotend_table};
use tempmgr_core::types::DutyRegs;
use tempmgr_traits::HeaterPin;

fn kind_from_index(i: u8) -> FaultKind {
    match i % 5 {
        0 => FaultKind::Max,
        1 => FaultKind::Min,
        2 => FaultKind::Preheat,
        3 => FaultKind::Runaway,
        _ => FaultKind::Model,
    }
}

proptest! {
    /// Converting a temperature to raw and back lands within the table's
    /// quantization error.
    #[test]
    fn table_round_trip(celsius in -20i16..300i16) {
        let t = default_hotend_table();
        let raw = t.raw_for(f32::from(celsius));
        let back = t.lookup(raw);
        prop_assert!(
            (back - f32::from(celsius)).abs() <= 1.0,
            "{celsius} -> {raw} -> {back}"
        );
    }

    #[test]
    fn bed_table_round_trip(celsius in -10i16..145i16) {
        let t = default_bed_table();
        let raw = t.raw_for(f32::from(celsius));
        let back = t.lookup(raw);
        prop_assert!((back - f32::from(celsius)).abs() <= 1.0);
    }

    /// The on-fraction over a full 128-tick window matches duty/127 within
    /// one step for any duty.
    #[test]
    fn soft_pwm_window_average(duty in 0u8..=127u8) {
        let mut pwm = SoftPwm::new(false, 4);
        let mut out = Outputs {
            hotend_pins: vec![Box::new(CountingPin::default()) as Box<dyn HeaterPin>],
            bed_pwm: Box::new(RecordingPwm::default()),
            fan: FanDrive::SoftPwm(Box::new(CountingPin::default())),
            beeper: Box::new(NullBeeper),
        };
        let duties = DutyRegs { hotend: [duty, 0, 0], bed: 0 };
        let mut on = 0u32;
        for _ in 0..128 {
            pwm.tick(&duties, 0, &mut out);
            if out.hotend_pins[0].is_high() {
                on += 1;
            }
        }
        let fraction = on as f32 / 128.0;
        let want = f32::from(duty) / 127.0;
        prop_assert!((fraction - want).abs() <= 1.0 / 127.0 + 1e-6);
    }

    /// Whatever the raise sequence, the recorded kind is the
    /// highest-priority kind ever raised.
    #[test]
    fn fault_priority_is_monotone(raises in proptest::collection::vec(0u8..15u8, 1..24)) {
        let word = FaultWord::new();
        let mut best: Option<FaultKind> = None;
        for r in raises {
            let kind = kind_from_index(r);
            let source = match r % 3 {
                0 => FaultSource::Hotend,
                1 => FaultSource::Bed,
                _ => FaultSource::Ambient,
            };
            word.raise(source, 0, kind);
            best = Some(match best {
                None => kind,
                Some(b) => b.min(kind),
            });
        }
        prop_assert_eq!(word.get().map(|f| f.kind), best);
    }
}

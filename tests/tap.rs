mod common;

use common::{engine, gated_engine, init_logger, leak_timer, Chain, Device, Mode, IDCODE};
use goodfet_jtag::{ShiftFlags, TapError, TapState};

const ID: u32 = 0x4BA0_0477;

fn one_device() -> Chain {
    Chain::new(vec![Device::new(4, Some(ID))])
}

#[test]
fn reset_reaches_idle_from_every_state() {
    init_logger();
    for start in TapState::all().filter(|s| *s != TapState::Unknown) {
        let mut chain = one_device();
        chain.state = start;
        let (chain, mut tap) = engine(chain);

        tap.reset_tap().unwrap();
        assert!(tap.in_run_idle());
        assert_eq!(chain.borrow().state, TapState::RunIdle, "from {:?}", start);
    }
}

#[test]
fn phase_predicates_follow_the_tap() {
    let (_, mut tap) = engine(one_device());
    assert!(tap.in_state(TapState::Unknown));
    tap.reset_tap().unwrap();
    assert!(!tap.in_dr() && !tap.in_ir());

    tap.enter_capture_dr().unwrap();
    assert!(tap.in_dr());
    tap.enter_shift().unwrap();
    assert!(tap.in_state(TapState::ShiftDR));
    tap.shift_bits(0, 4, ShiftFlags::MSB).unwrap();
    assert!(tap.in_run_idle());

    tap.enter_capture_ir().unwrap();
    assert!(tap.in_ir());
    assert!(!tap.in_dr());
}

#[test]
fn idcode_reads_back_in_either_order() {
    init_logger();
    let (chain, mut tap) = engine(one_device());
    tap.reset_tap().unwrap();

    let lsb = tap.shift_dr(0, 32, ShiftFlags::LSB).unwrap();
    assert_eq!(lsb, ID);
    let msb = tap.shift_dr(0, 32, ShiftFlags::MSB).unwrap();
    assert_eq!(msb, ID.reverse_bits());
    assert_eq!(chain.borrow().state, TapState::RunIdle);
}

#[test]
fn loopback_returns_what_was_sent() {
    let (_, mut tap) = engine(Chain::with_mode(Mode::Loopback));
    tap.reset_tap().unwrap();
    assert_eq!(tap.shift_dr(0xA5C3, 16, ShiftFlags::MSB).unwrap(), 0xA5C3);
    assert_eq!(tap.shift_dr(0x2D, 7, ShiftFlags::LSB).unwrap(), 0x2D);
    assert_eq!(tap.shift_data16(0x1234).unwrap(), 0x1234);
    assert_eq!(tap.shift_instruction8(0x83).unwrap(), 0x83);
}

#[test]
fn held_shifts_concatenate() {
    let (_, mut tap) = engine(one_device());
    tap.reset_tap().unwrap();
    let whole = tap.shift_dr(0, 24, ShiftFlags::LSB).unwrap();

    let low = tap
        .shift_dr(0, 12, ShiftFlags::LSB | ShiftFlags::HOLD)
        .unwrap();
    assert!(tap.in_state(TapState::ShiftDR));
    let high = tap.shift_dr_more(0, 12, ShiftFlags::LSB).unwrap();
    assert!(tap.in_run_idle());

    assert_eq!(low | (high << 12), whole);
    assert_eq!(whole, ID & 0x00FF_FFFF);
}

#[test]
fn instruction_reaches_the_device() {
    let (chain, mut tap) = engine(one_device());
    tap.reset_tap().unwrap();
    let captured = tap.shift_ir(0xF, 4, ShiftFlags::LSB).unwrap();
    // Capture-IR loads 0b01
    assert_eq!(captured, 0b01);
    assert_eq!(chain.borrow().devices[0].instruction(), 0xF);

    // BYPASS: one zero bit ahead of whatever is shifted in
    let out = tap.shift_dr(0b1011, 4, ShiftFlags::LSB).unwrap();
    assert_eq!(out, 0b0110);

    tap.reset_tap().unwrap();
    assert_eq!(chain.borrow().devices[0].instruction(), IDCODE);
}

#[test]
fn no_return_idle_stops_in_update() {
    let (chain, mut tap) = engine(one_device());
    tap.reset_tap().unwrap();
    tap.shift_ir(0x1, 4, ShiftFlags::NO_RETURN_IDLE).unwrap();
    assert!(tap.in_state(TapState::UpdateIR));
    assert_eq!(chain.borrow().state, TapState::UpdateIR);

    // Update-IR leads straight on to a data scan
    tap.shift_dr(0, 8, ShiftFlags::NO_RETURN_IDLE).unwrap();
    assert!(tap.in_state(TapState::UpdateDR));
    tap.return_to_idle().unwrap();
    assert_eq!(chain.borrow().state, TapState::RunIdle);
}

#[test]
fn invalid_transitions_move_nothing() {
    let (chain, mut tap) = engine(one_device());

    // nothing is allowed before the first reset
    assert_eq!(
        tap.enter_capture_dr(),
        Err(TapError::Transition {
            from: TapState::Unknown,
            to: TapState::CaptureDR
        })
    );
    assert_eq!(chain.borrow().clocks, 0);

    tap.reset_tap().unwrap();
    assert_eq!(
        tap.shift_bits(1, 1, ShiftFlags::MSB),
        Err(TapError::NotShifting(TapState::RunIdle))
    );
    assert_eq!(
        tap.enter_shift(),
        Err(TapError::Transition {
            from: TapState::RunIdle,
            to: TapState::ShiftDR
        })
    );
    assert_eq!(
        tap.shift_dr_more(0, 8, ShiftFlags::MSB),
        Err(TapError::Transition {
            from: TapState::RunIdle,
            to: TapState::ShiftDR
        })
    );

    tap.enter_capture_ir().unwrap();
    tap.enter_shift().unwrap();
    assert_eq!(
        tap.enter_capture_dr(),
        Err(TapError::Transition {
            from: TapState::ShiftIR,
            to: TapState::CaptureDR
        })
    );
    assert_eq!(
        tap.shift_bits(0, 33, ShiftFlags::MSB),
        Err(TapError::BitCount(33))
    );
    assert!(tap.in_state(TapState::ShiftIR));
    assert_eq!(chain.borrow().state, TapState::ShiftIR);
}

#[test]
fn shifts_restore_tdi() {
    let (chain, mut tap) = engine(one_device());
    tap.reset_tap().unwrap();
    tap.set_tclk(true).unwrap();
    tap.shift_dr(0, 32, ShiftFlags::MSB).unwrap();
    assert!(tap.tclk());
    assert!(chain.borrow().tdi);

    tap.set_tclk(false).unwrap();
    tap.shift_dr(u32::MAX, 32, ShiftFlags::MSB).unwrap();
    assert!(!chain.borrow().tdi);
}

#[test]
fn ticks_are_suspended_while_clocking() {
    let timer = leak_timer();
    let mut chain = one_device();
    chain.watch(timer);
    let (chain, mut tap) = gated_engine(chain, timer);

    tap.reset_tap().unwrap();
    tap.shift_ir(0x1, 4, ShiftFlags::MSB).unwrap();
    tap.shift_dr(0, 32, ShiftFlags::MSB).unwrap();
    tap.tclk_flash_pulses(3).unwrap();
    tap.probe_chain_length().unwrap();

    assert!(chain.borrow().clocks > 0);
    assert_eq!(chain.borrow().unsuspended_clocks, 0);
    assert!(!timer.is_suspended());
}

#[test]
fn pins_set_up_and_release() {
    let (chain, mut tap) = engine(one_device());
    tap.initialize_pins().unwrap();
    {
        let chain = chain.borrow();
        assert!(chain.tdi && chain.reset && !chain.test_strap);
    }

    tap.reset_tap().unwrap();
    tap.set_test_strap(true).unwrap();
    assert!(chain.borrow().test_strap);

    tap.release_pins().unwrap();
    assert!(tap.in_state(TapState::Unknown));
    let chain = chain.borrow();
    assert!(!chain.tdi && !chain.test_strap && chain.reset);
}

#[test]
fn target_reset_is_a_low_pulse() {
    let (chain, mut tap) = engine(one_device());
    tap.initialize_pins().unwrap();
    tap.pulse_target_reset().unwrap();
    let chain = chain.borrow();
    assert_eq!(chain.reset_pulses, 1);
    assert!(chain.reset);
    assert_eq!(chain.delay_us, u64::from(tap.config().reset_pulse_us));
}

#[test]
fn flash_pulses_leave_the_tap_alone() {
    let (chain, mut tap) = engine(one_device());
    tap.reset_tap().unwrap();
    tap.set_tclk(false).unwrap();
    let (clocks, pulses) = {
        let chain = chain.borrow();
        (chain.clocks, chain.tdi_pulses)
    };

    tap.tclk_flash_pulses(10).unwrap();
    let chain = chain.borrow();
    assert_eq!(chain.tdi_pulses - pulses, 10);
    assert_eq!(chain.clocks, clocks);
    assert!(!chain.tdi);
    assert!(tap.in_run_idle());
}

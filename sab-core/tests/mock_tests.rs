use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    convert::Infallible,
    rc::Rc,
};

use embedded_hal::{
    delay::DelayNs,
    digital::{ErrorKind, ErrorType, OutputPin, StatefulOutputPin},
};
use embedded_hal_mock::eh1::pwm::{Mock as PwmMock, Transaction as PwmTrans};
use sab_core::utils::{
    config::{BoardConfig, DwellMode},
    connection::{
        handshake::{connect, Handshake, HandshakeError, HandshakePolicy},
        server::{CommandLoop, LoopError, Serviced},
        transport::{Clock, Line, LineTransport},
    },
    controllers::{ActuatorError, Dispatch, PulseWidthOutput, SystemController, Unattached},
    Duration, Instant,
};

/// GPIO whose level the test can still see after handing the pin over.
#[derive(Clone, Default)]
struct SharedPin(Rc<Cell<bool>>);

impl ErrorType for SharedPin {
    type Error = Infallible;
}

impl OutputPin for SharedPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.set(true);
        Ok(())
    }
}

impl StatefulOutputPin for SharedPin {
    fn is_set_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.0.get())
    }

    fn is_set_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.0.get())
    }
}

/// Pin whose next `failures` writes report an error.
#[derive(Clone, Default)]
struct FlakyPin {
    high: Rc<Cell<bool>>,
    failures: Rc<Cell<u32>>,
}

impl FlakyPin {
    fn write(
        &mut self,
        high: bool,
    ) -> Result<(), ErrorKind> {
        if self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            return Err(ErrorKind::Other);
        }
        self.high.set(high);
        Ok(())
    }
}

impl ErrorType for FlakyPin {
    type Error = ErrorKind;
}

impl OutputPin for FlakyPin {
    fn set_low(&mut self) -> Result<(), ErrorKind> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), ErrorKind> {
        self.write(true)
    }
}

impl StatefulOutputPin for FlakyPin {
    fn is_set_high(&mut self) -> Result<bool, ErrorKind> {
        Ok(self.high.get())
    }

    fn is_set_low(&mut self) -> Result<bool, ErrorKind> {
        Ok(!self.high.get())
    }
}

/// Pulse output that fails the write calls listed in `fail_calls` (0-based).
#[derive(Clone, Default)]
struct FlakyChannel {
    written: Rc<RefCell<Vec<u16>>>,
    calls: Rc<Cell<usize>>,
    fail_calls: Rc<RefCell<Vec<usize>>>,
}

impl PulseWidthOutput for FlakyChannel {
    fn write_pulse_width(
        &mut self,
        pulse_us: u16,
    ) -> Result<(), ActuatorError> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if self.fail_calls.borrow().contains(&call) {
            return Err(ActuatorError::Pwm(embedded_hal::pwm::ErrorKind::Other));
        }
        self.written.borrow_mut().push(pulse_us);
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
struct HungUp;

/// Pre-recorded input lines and every line written back.
struct ScriptedLink {
    input: VecDeque<&'static str>,
    output: Vec<String>,
    /// Once the input runs dry, report a dead link instead of idling.
    hang_up: bool,
}

impl ScriptedLink {
    fn new(input: &[&'static str]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            output: Vec::new(),
            hang_up: true,
        }
    }

    fn open(input: &[&'static str]) -> Self {
        Self {
            hang_up: false,
            ..Self::new(input)
        }
    }
}

impl LineTransport for ScriptedLink {
    type Error = HungUp;

    fn available(&mut self) -> Result<bool, HungUp> {
        match (self.input.is_empty(), self.hang_up) {
            (false, _) => Ok(true),
            (true, false) => Ok(false),
            (true, true) => Err(HungUp),
        }
    }

    fn read_line(
        &mut self,
        _timeout: Duration,
    ) -> Result<Line, HungUp> {
        let text = self.input.pop_front().ok_or(HungUp)?;
        Ok(Line::try_from(text).unwrap())
    }

    fn write_line(
        &mut self,
        line: &str,
    ) -> Result<(), HungUp> {
        self.output.push(line.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct CountingDelay {
    ns: u64,
}

impl DelayNs for CountingDelay {
    fn delay_ns(
        &mut self,
        ns: u32,
    ) {
        self.ns += u64::from(ns);
    }
}

struct FixedClock(Instant);

impl Clock for FixedClock {
    fn now(&self) -> Instant {
        self.0
    }
}

/// 50 Hz with a 20000-step counter: duty equals the pulse width in us.
const MAX_DUTY: u16 = 20_000;

fn pins(count: usize) -> Vec<SharedPin> {
    (0..count).map(|_| SharedPin::default()).collect()
}

#[test]
fn led_bank_session() {
    let config = BoardConfig::led_bank();
    let expectations = [
        PwmTrans::max_duty_cycle(MAX_DUTY),
        PwmTrans::set_duty_cycle(900),
        PwmTrans::set_duty_cycle(1110),
        PwmTrans::set_duty_cycle(1900),
        PwmTrans::set_duty_cycle(1505),
    ];
    let mut esc = PwmMock::new(&expectations);
    let leds = pins(4);

    let controller = SystemController::attach_from_config(
        &config,
        leds.iter().cloned(),
        Some(&mut esc),
        None::<&mut PwmMock>,
    )
    .unwrap();

    let link = ScriptedLink::new(&[
        "hello",
        "READY\r",
        "LED H 0",
        "LED T 0",
        "LED T 3",
        "LED H 9",
        "LED X 1",
        "THROTTLE 150",
        "THROTTLE 50abc",
        "FOO",
    ]);
    let mut delay = CountingDelay::default();
    let mut command_loop = CommandLoop::new(link, controller, config.link);
    let result = command_loop.run(&FixedClock(Instant::from_ticks(0)), &mut delay);
    assert!(matches!(result, Err(LoopError::Transport(HungUp))));

    let (link, controller) = command_loop.into_parts();
    assert!(controller.motor().is_some_and(|m| m.is_armed()));
    drop(controller);
    esc.done();

    assert_eq!(
        link.output,
        [
            "READY_ACK",
            "LED0 is HIGH",
            "LED0 toggled to LOW",
            "LED3 toggled to HIGH",
            "Invalid LED index.",
            "Unknown LED command. Use 'LED H <index>' or 'LED L <index>' or 'LED T <index>'.",
            "Throttle set to 150%",
            "Throttle set to 50%",
            "Unknown command. Use 'LED H <index>', 'LED L <index>', 'LED T <index>', or 'THROTTLE <value>'.",
        ]
    );
    assert!(!leds[0].0.get());
    assert!(leds[3].0.get());
    // ESC settle time
    assert!(delay.ns >= 3_000_000_000);
}

#[test]
fn servo_light_blocking_session() {
    let config = BoardConfig::servo_light();
    let expectations = [
        PwmTrans::max_duty_cycle(MAX_DUTY),
        PwmTrans::set_duty_cycle(1500),
        // LIGHT TOGGLE from off
        PwmTrans::set_duty_cycle(2000),
        PwmTrans::set_duty_cycle(1500),
        // LIGHT OFF
        PwmTrans::set_duty_cycle(1000),
        PwmTrans::set_duty_cycle(1500),
    ];
    let mut servo = PwmMock::new(&expectations);

    let controller = SystemController::<SharedPin, _, _>::attach_from_config(
        &config,
        Vec::new(),
        None::<&mut PwmMock>,
        Some(&mut servo),
    )
    .unwrap();

    let link = ScriptedLink::open(&["READY", "LIGHT TOGGLE", "LIGHT OFF", "LIGHT"]);
    let mut delay = CountingDelay::default();
    let mut command_loop = CommandLoop::new(link, controller, config.link);
    command_loop.start(&mut delay).unwrap();
    let now = Instant::from_ticks(0);
    for _ in 0..3 {
        assert_eq!(command_loop.service(now, &mut delay), Ok(Serviced::Replied));
    }
    assert_eq!(command_loop.service(now, &mut delay), Ok(Serviced::Idle));

    let (link, controller) = command_loop.into_parts();
    assert!(controller.light().is_some_and(|l| !l.is_on()));
    drop(controller);
    servo.done();

    assert_eq!(
        link.output,
        [
            "READY_ACK",
            "LIGHT is ON",
            "LIGHT is OFF",
            "Unknown command. Use 'LIGHT ON', 'LIGHT OFF', or 'LIGHT TOGGLE'.",
        ]
    );
    assert_eq!(delay.ns, 2 * 800_000_000);
}

#[test]
fn polled_dwell_defers_reply_and_input() {
    let mut config = BoardConfig::servo_light();
    config.link.dwell = DwellMode::Polled;
    let expectations = [
        PwmTrans::max_duty_cycle(MAX_DUTY),
        PwmTrans::set_duty_cycle(1500),
        PwmTrans::set_duty_cycle(2000),
        PwmTrans::set_duty_cycle(1500),
        PwmTrans::set_duty_cycle(1000),
        PwmTrans::set_duty_cycle(1500),
    ];
    let mut servo = PwmMock::new(&expectations);

    let controller = SystemController::<SharedPin, _, _>::attach_from_config(
        &config,
        Vec::new(),
        None::<&mut PwmMock>,
        Some(&mut servo),
    )
    .unwrap();

    let link = ScriptedLink::open(&["READY", "LIGHT ON", "LIGHT OFF"]);
    let mut delay = CountingDelay::default();
    let mut command_loop = CommandLoop::new(link, controller, config.link);
    command_loop.start(&mut delay).unwrap();

    let t0 = Instant::from_millis(5_000);
    let ms = Duration::from_millis;
    assert_eq!(command_loop.service(t0, &mut delay), Ok(Serviced::Busy));
    assert_eq!(command_loop.service(t0 + ms(400), &mut delay), Ok(Serviced::Busy));
    // still queued while the servo holds
    assert_eq!(command_loop.transport().input.len(), 1);
    assert_eq!(command_loop.transport().output, ["READY_ACK"]);

    assert_eq!(command_loop.service(t0 + ms(800), &mut delay), Ok(Serviced::Replied));
    assert_eq!(command_loop.service(t0 + ms(800), &mut delay), Ok(Serviced::Busy));
    assert_eq!(command_loop.service(t0 + ms(1599), &mut delay), Ok(Serviced::Busy));
    assert_eq!(command_loop.service(t0 + ms(1600), &mut delay), Ok(Serviced::Replied));
    assert_eq!(command_loop.service(t0 + ms(1600), &mut delay), Ok(Serviced::Idle));
    assert_eq!(delay.ns, 0);

    let (link, controller) = command_loop.into_parts();
    drop(controller);
    servo.done();
    assert_eq!(link.output, ["READY_ACK", "LIGHT is ON", "LIGHT is OFF"]);
}

#[test]
fn handshake_acknowledges_once_amid_noise() {
    let config = BoardConfig::single_led();
    let leds = pins(1);
    let controller = SystemController::<_, Unattached, Unattached>::from_config(
        &config,
        leds.iter().cloned(),
        None,
        None,
    )
    .unwrap();

    let link = ScriptedLink::new(&["", "noise", "ready", "READY", "READY", "ON", "LED ON"]);
    let mut command_loop = CommandLoop::new(link, controller, config.link);
    let mut delay = CountingDelay::default();
    let result = command_loop.run(&FixedClock(Instant::from_ticks(0)), &mut delay);
    assert!(result.is_err());

    let (link, _) = command_loop.into_parts();
    assert_eq!(
        link.output,
        [
            "READY_ACK",
            "Unknown command. Use 'ON' or 'OFF'.",
            "LED is ON",
            "Unknown command. Use 'ON' or 'OFF'.",
        ]
    );
    assert_eq!(link.output.iter().filter(|l| *l == "READY_ACK").count(), 1);
    assert!(leds[0].0.get());
}

#[test]
fn switched_led_profile() {
    let config = BoardConfig::switched_led();
    let leds = pins(1);
    let controller = SystemController::<_, Unattached, Unattached>::from_config(
        &config,
        leds.iter().cloned(),
        None,
        None,
    )
    .unwrap();

    let link = ScriptedLink::new(&["READY", "LED ON", "  LED OFF  ", "ON"]);
    let mut command_loop = CommandLoop::new(link, controller, config.link);
    let _ = command_loop.run(&FixedClock(Instant::from_ticks(0)), &mut CountingDelay::default());

    let (link, _) = command_loop.into_parts();
    assert_eq!(
        link.output,
        [
            "READY_ACK",
            "LED is ON",
            "LED is OFF",
            "Unknown command. Use 'LED ON' or 'LED OFF'.",
        ]
    );
    assert!(!leds[0].0.get());
}

#[test]
fn bounded_handshake_gives_up() {
    let mut link = ScriptedLink::new(&["a", "b", "c", "READY"]);
    let policy = HandshakePolicy {
        read_timeout: Duration::from_millis(2000),
        max_attempts: Some(3),
    };
    let result = Handshake::establish(&mut link, policy);
    assert!(matches!(result, Err(HandshakeError::Exhausted { attempts: 3 })));
    assert!(link.output.is_empty());
    assert_eq!(link.input, ["READY"]);
}

#[test]
fn host_connect_waits_for_ack() {
    let mut link = ScriptedLink::new(&["booting", "", "READY_ACK\r"]);
    connect(&mut link, HandshakePolicy::default()).unwrap();
    assert_eq!(link.output, ["READY"]);
    assert!(link.input.is_empty());
}

#[test]
fn mismatched_channels_are_rejected() {
    let config = BoardConfig::led_bank();
    let result = SystemController::<SharedPin, Unattached, Unattached>::from_config(
        &config,
        pins(4),
        None,
        None,
    );
    assert!(result.is_err());
}

#[test]
fn board_config_from_json() {
    let json = r#"{
        "name": "porch",
        "leds": { "syntax": "indexed", "pins": [4, 5] },
        "motor": {
            "pin": 17,
            "frequency_hz": 50,
            "attach": { "min_us": 500, "max_us": 2500 },
            "throttle": { "min_us": 1000, "max_us": 2000 },
            "arm_us": 900,
            "settle_ms": 1500
        },
        "link": { "dwell": "polled", "handshake_attempts": 10 }
    }"#;
    let config: BoardConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.validate(), Ok(()));
    assert_eq!(config.name.as_str(), "porch");
    assert_eq!(config.leds.pins.as_slice(), [4, 5]);
    assert_eq!(config.light, None);
    assert_eq!(config.link.dwell, DwellMode::Polled);
    assert_eq!(config.link.handshake_attempts, Some(10));
    assert_eq!(config.link.read_timeout_ms, 2000);
    assert_eq!(config.motor.map(|m| m.settle()), Some(Duration::from_millis(1500)));

    let preset = BoardConfig::led_bank();
    let text = serde_json::to_string(&preset).unwrap();
    assert_eq!(serde_json::from_str::<BoardConfig>(&text).unwrap(), preset);
}

#[test]
fn service_handshakes_before_dispatching() {
    let config = BoardConfig::single_led();
    let leds = pins(1);
    let controller = SystemController::<_, Unattached, Unattached>::from_config(
        &config,
        leds.iter().cloned(),
        None,
        None,
    )
    .unwrap();

    let link = ScriptedLink::open(&["ON", "READY", "ON"]);
    let mut command_loop = CommandLoop::new(link, controller, config.link);
    let mut delay = CountingDelay::default();
    let now = Instant::from_ticks(0);

    assert_eq!(command_loop.service(now, &mut delay), Ok(Serviced::AwaitingReady));
    assert!(!command_loop.is_connected());
    assert!(!leds[0].0.get());
    assert!(command_loop.transport().output.is_empty());

    assert_eq!(command_loop.service(now, &mut delay), Ok(Serviced::Replied));
    assert!(command_loop.is_connected());
    assert_eq!(command_loop.service(now, &mut delay), Ok(Serviced::Replied));

    assert_eq!(command_loop.transport().output, ["READY_ACK", "LED is ON"]);
    assert!(leds[0].0.get());
}

#[test]
fn service_arms_esc_before_handshake() {
    let config = BoardConfig::led_bank();
    let expectations = [
        PwmTrans::max_duty_cycle(MAX_DUTY),
        PwmTrans::set_duty_cycle(900),
        PwmTrans::set_duty_cycle(1110),
        PwmTrans::set_duty_cycle(1505),
    ];
    let mut esc = PwmMock::new(&expectations);
    let controller = SystemController::attach_from_config(
        &config,
        pins(4),
        Some(&mut esc),
        None::<&mut PwmMock>,
    )
    .unwrap();

    let link = ScriptedLink::open(&["THROTTLE 50", "READY", "THROTTLE 50"]);
    let mut command_loop = CommandLoop::new(link, controller, config.link);
    let mut delay = CountingDelay::default();
    let now = Instant::from_ticks(0);
    for expected in [Serviced::AwaitingReady, Serviced::Replied, Serviced::Replied] {
        assert_eq!(command_loop.service(now, &mut delay), Ok(expected));
    }
    assert_eq!(delay.ns, 3_000_000_000);

    let (link, controller) = command_loop.into_parts();
    drop(controller);
    esc.done();
    assert_eq!(link.output, ["READY_ACK", "Throttle set to 50%"]);
}

#[test]
fn service_honours_handshake_limit() {
    let mut config = BoardConfig::single_led();
    config.link.handshake_attempts = Some(2);
    let controller = SystemController::<_, Unattached, Unattached>::from_config(
        &config,
        pins(1),
        None,
        None,
    )
    .unwrap();

    let link = ScriptedLink::open(&["ON", "OFF", "READY"]);
    let mut command_loop = CommandLoop::new(link, controller, config.link);
    let mut delay = CountingDelay::default();
    let now = Instant::from_ticks(0);
    assert_eq!(command_loop.service(now, &mut delay), Ok(Serviced::AwaitingReady));
    assert_eq!(command_loop.service(now, &mut delay), Ok(Serviced::AwaitingReady));
    assert_eq!(
        command_loop.service(now, &mut delay),
        Err(LoopError::Handshake(HandshakeError::Exhausted { attempts: 2 }))
    );
    assert!(command_loop.transport().output.is_empty());
}

#[test]
fn pin_fault_replies_and_loop_continues() {
    let config = BoardConfig::single_led();
    let pin = FlakyPin::default();
    let controller = SystemController::<_, Unattached, Unattached>::from_config(
        &config,
        [pin.clone()],
        None,
        None,
    )
    .unwrap();

    let link = ScriptedLink::new(&["READY", "ON", "ON"]);
    let mut command_loop = CommandLoop::new(link, controller, config.link);
    let mut delay = CountingDelay::default();
    command_loop.start(&mut delay).unwrap();

    pin.failures.set(1);
    let result = command_loop.run(&FixedClock(Instant::from_ticks(0)), &mut delay);
    assert!(matches!(result, Err(LoopError::Transport(HungUp))));

    let (link, _) = command_loop.into_parts();
    assert_eq!(link.output, ["READY_ACK", "Actuator fault.", "LED is ON"]);
    assert!(pin.high.get());
}

#[test]
fn readback_toggle_fault_keeps_level() {
    let config = BoardConfig::led_bank();
    let bank: Vec<FlakyPin> = (0..4).map(|_| FlakyPin::default()).collect();
    let esc = FlakyChannel::default();
    let mut controller = SystemController::<_, _, Unattached>::from_config(
        &config,
        bank.iter().cloned(),
        Some(esc),
        None,
    )
    .unwrap();
    let mut delay = CountingDelay::default();
    controller.start(&mut delay).unwrap();

    bank[2].failures.set(1);
    let reply = controller.handle_line("LED T 2", &mut delay);
    assert_eq!(reply.as_str(), "Actuator fault.");
    assert!(!bank[2].high.get());
    assert_eq!(
        controller.handle_line("LED T 2", &mut delay).as_str(),
        "LED2 toggled to HIGH"
    );
}

#[test]
fn throttle_faults_reply_instead_of_stopping() {
    let config = BoardConfig::led_bank();
    let esc = FlakyChannel::default();
    let mut controller = SystemController::<_, _, Unattached>::from_config(
        &config,
        pins(4),
        Some(esc.clone()),
        None,
    )
    .unwrap();
    let mut delay = CountingDelay::default();

    // not armed yet
    let reply = controller.handle_line("THROTTLE 10", &mut delay);
    assert_eq!(reply.as_str(), "Actuator fault.");
    assert!(esc.written.borrow().is_empty());

    controller.start(&mut delay).unwrap();
    esc.fail_calls.borrow_mut().push(2);
    let reply = controller.handle_line("THROTTLE 10", &mut delay);
    assert_eq!(reply.as_str(), "Actuator fault.");
    assert_eq!(
        controller.handle_line("THROTTLE 10", &mut delay).as_str(),
        "Throttle set to 10%"
    );
    assert_eq!(*esc.written.borrow(), [900, 1110, 1189]);
}

type LightBoard = SystemController<SharedPin, Unattached, FlakyChannel>;

fn flaky_light(channel: &FlakyChannel) -> LightBoard {
    SystemController::from_config(
        &BoardConfig::servo_light(),
        Vec::new(),
        None,
        Some(channel.clone()),
    )
    .unwrap()
}

#[test]
fn blocking_light_fault_replies_once() {
    let channel = FlakyChannel::default();
    let mut controller = flaky_light(&channel);
    let mut delay = CountingDelay::default();

    // call 0 is the midpoint, call 1 the swing target
    channel.fail_calls.borrow_mut().push(1);
    let reply = controller.handle_line("LIGHT ON", &mut delay);
    assert_eq!(reply.as_str(), "Actuator fault.");
    assert!(!controller.is_busy());
    assert!(controller.light().is_some_and(|l| !l.is_on()));

    assert_eq!(controller.handle_line("LIGHT ON", &mut delay).as_str(), "LIGHT is ON");
    assert_eq!(*channel.written.borrow(), [1500, 2000, 1500]);
}

#[test]
fn polled_light_faults_surface_as_replies() {
    let channel = FlakyChannel::default();
    let mut controller = flaky_light(&channel);
    let t0 = Instant::from_millis(1_000);

    // target write fails: reply right away
    channel.fail_calls.borrow_mut().push(1);
    match controller.begin_line("LIGHT TOGGLE", t0) {
        Dispatch::Reply(reply) => assert_eq!(reply.as_str(), "Actuator fault."),
        Dispatch::Pending => panic!("swing should not be pending"),
    }
    assert!(!controller.is_busy());

    // return-to-neutral write fails: reply from poll
    channel.fail_calls.borrow_mut().push(3);
    assert_eq!(controller.begin_line("LIGHT TOGGLE", t0), Dispatch::Pending);
    assert_eq!(controller.poll(t0 + Duration::from_millis(400)), None);
    let reply = controller.poll(t0 + Duration::from_millis(800)).unwrap();
    assert_eq!(reply.as_str(), "Actuator fault.");
    assert!(!controller.is_busy());
    assert!(controller.light().is_some_and(|l| !l.is_on()));
    assert_eq!(controller.poll(t0 + Duration::from_millis(900)), None);
}

#[test]
fn channels_attach_with_config_frequency() {
    let mut config = BoardConfig::led_bank();
    if let Some(motor) = config.motor.as_mut() {
        motor.frequency_hz = 100;
    }
    // 100 Hz: 10 ms period, so duty is twice the pulse width in us
    let expectations = [
        PwmTrans::max_duty_cycle(MAX_DUTY),
        PwmTrans::set_duty_cycle(1800),
        PwmTrans::set_duty_cycle(2220),
    ];
    let mut esc = PwmMock::new(&expectations);
    let mut controller = SystemController::attach_from_config(
        &config,
        pins(4),
        Some(&mut esc),
        None::<&mut PwmMock>,
    )
    .unwrap();
    controller.start(&mut CountingDelay::default()).unwrap();
    drop(controller);
    esc.done();
}

#[test]
fn attach_rejects_channel_without_section() {
    let mut unused = PwmMock::new(&[]);
    let result = SystemController::attach_from_config(
        &BoardConfig::single_led(),
        pins(1),
        Some(&mut unused),
        None::<&mut PwmMock>,
    );
    assert!(matches!(result, Err(ActuatorError::ProfileMismatch(_))));
    drop(result);
    unused.done();
}

use tracing::{debug, error, warn};

use crate::codec;
use crate::error::SessionError;

/// Lifecycle of one monitoring attempt. `Disconnected` is terminal; a new
/// `Session` is constructed to start over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scanning,
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics,
    Subscribing,
    Streaming,
    Disconnected,
}

/// Inbound events. Each platform callback or GUI request becomes one of
/// these, so all transition logic runs single-threaded in `Session::handle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Adapter reported powered-on.
    AdapterReady,
    /// First peripheral matching the heart rate scan filter was seen.
    PeripheralFound,
    /// Connection attempt completed.
    Connected,
    /// Service discovery completed.
    ServicesResolved { heart_rate_present: bool },
    /// Characteristic lookup completed.
    CharacteristicResolved { found: bool },
    /// Notifications confirmed enabled.
    Subscribed,
    /// One raw measurement frame arrived.
    Measurement(Vec<u8>),
    /// A step failed; the machine halts where it is.
    StepFailed(SessionError),
    /// The UI asked for teardown.
    StopRequested,
}

/// Requests the driver executes on behalf of the machine. The next request
/// in the GATT sequence is only emitted from the completion event of the
/// previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartScan,
    StopScan,
    Connect,
    DiscoverServices,
    ResolveCharacteristic,
    Subscribe,
    PublishBpm(u16),
    Disconnect,
}

pub struct Session {
    phase: Phase,
    bpm: u16,
    fault: Option<SessionError>,
}

impl Session {
    pub fn new() -> Self {
        Session {
            phase: Phase::Idle,
            bpm: 0,
            fault: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn bpm(&self) -> u16 {
        self.bpm
    }

    /// Feed one event through the machine and collect the requests it wants
    /// executed. Events arriving after `Disconnected`, or out of order for
    /// the current phase, are ignored.
    pub fn handle(&mut self, event: Event) -> Vec<Command> {
        if self.phase == Phase::Disconnected {
            debug!(?event, "session already disconnected, event ignored");
            return Vec::new();
        }
        if matches!(event, Event::StopRequested) {
            return self.tear_down();
        }

        match (self.phase, event) {
            (Phase::Idle, Event::AdapterReady) => {
                self.phase = Phase::Scanning;
                vec![Command::StartScan]
            }
            (Phase::Scanning, Event::PeripheralFound) => {
                // first-found wins; scanning stops before connecting
                self.phase = Phase::Connecting;
                vec![Command::StopScan, Command::Connect]
            }
            (Phase::Connecting, Event::Connected) => {
                self.phase = Phase::DiscoveringServices;
                vec![Command::DiscoverServices]
            }
            (Phase::DiscoveringServices, Event::ServicesResolved { heart_rate_present }) => {
                if heart_rate_present {
                    self.phase = Phase::DiscoveringCharacteristics;
                    vec![Command::ResolveCharacteristic]
                } else {
                    warn!("sensor exposes no heart rate service, session halted");
                    self.fault = Some(SessionError::DiscoveryFailed);
                    Vec::new()
                }
            }
            (Phase::DiscoveringCharacteristics, Event::CharacteristicResolved { found }) => {
                if found {
                    self.phase = Phase::Subscribing;
                    vec![Command::Subscribe]
                } else {
                    warn!("heart rate measurement characteristic not found, session halted");
                    self.fault = Some(SessionError::DiscoveryFailed);
                    Vec::new()
                }
            }
            (Phase::Subscribing, Event::Subscribed) => {
                self.phase = Phase::Streaming;
                Vec::new()
            }
            (Phase::Streaming, Event::Measurement(frame)) => match codec::decode_bpm(&frame) {
                Ok(bpm) => {
                    self.bpm = bpm;
                    vec![Command::PublishBpm(bpm)]
                }
                Err(err) => {
                    // drop the frame, keep the previous reading
                    warn!("{err}, frame dropped");
                    Vec::new()
                }
            },
            (_, Event::StepFailed(err)) => {
                error!("session halted: {err}");
                self.fault = Some(err);
                Vec::new()
            }
            (phase, event) => {
                debug!(?phase, ?event, "event out of order, ignored");
                Vec::new()
            }
        }
    }

    /// Stop from any phase: cancel whatever was in flight, zero the
    /// published reading, become terminal. Safe to call repeatedly.
    fn tear_down(&mut self) -> Vec<Command> {
        let mut commands = match self.phase {
            Phase::Idle => Vec::new(),
            Phase::Scanning => vec![Command::StopScan],
            _ => vec![Command::Disconnect],
        };
        if self.bpm != 0 {
            self.bpm = 0;
            commands.push(Command::PublishBpm(0));
        }
        self.phase = Phase::Disconnected;
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming_session() -> Session {
        let mut session = Session::new();
        session.handle(Event::AdapterReady);
        session.handle(Event::PeripheralFound);
        session.handle(Event::Connected);
        session.handle(Event::ServicesResolved { heart_rate_present: true });
        session.handle(Event::CharacteristicResolved { found: true });
        session.handle(Event::Subscribed);
        assert_eq!(session.phase(), Phase::Streaming);
        session
    }

    #[test]
    fn walks_the_full_lifecycle() {
        let mut session = Session::new();
        assert_eq!(session.phase(), Phase::Idle);

        assert_eq!(session.handle(Event::AdapterReady), vec![Command::StartScan]);
        assert_eq!(session.phase(), Phase::Scanning);

        assert_eq!(
            session.handle(Event::PeripheralFound),
            vec![Command::StopScan, Command::Connect]
        );
        assert_eq!(session.phase(), Phase::Connecting);

        assert_eq!(session.handle(Event::Connected), vec![Command::DiscoverServices]);
        assert_eq!(session.phase(), Phase::DiscoveringServices);

        assert_eq!(
            session.handle(Event::ServicesResolved { heart_rate_present: true }),
            vec![Command::ResolveCharacteristic]
        );
        assert_eq!(session.phase(), Phase::DiscoveringCharacteristics);

        assert_eq!(
            session.handle(Event::CharacteristicResolved { found: true }),
            vec![Command::Subscribe]
        );
        assert_eq!(session.phase(), Phase::Subscribing);

        assert_eq!(session.handle(Event::Subscribed), Vec::new());
        assert_eq!(session.phase(), Phase::Streaming);

        assert_eq!(
            session.handle(Event::Measurement(vec![0x00, 0x48])),
            vec![Command::PublishBpm(72)]
        );
        assert_eq!(session.bpm(), 72);
        assert_eq!(session.phase(), Phase::Streaming);
    }

    #[test]
    fn missing_service_halts_in_place() {
        let mut session = Session::new();
        session.handle(Event::AdapterReady);
        session.handle(Event::PeripheralFound);
        session.handle(Event::Connected);

        assert_eq!(
            session.handle(Event::ServicesResolved { heart_rate_present: false }),
            Vec::new()
        );
        assert_eq!(session.phase(), Phase::DiscoveringServices);
        assert_eq!(session.bpm(), 0);
    }

    #[test]
    fn missing_characteristic_halts_in_place() {
        let mut session = Session::new();
        session.handle(Event::AdapterReady);
        session.handle(Event::PeripheralFound);
        session.handle(Event::Connected);
        session.handle(Event::ServicesResolved { heart_rate_present: true });

        assert_eq!(
            session.handle(Event::CharacteristicResolved { found: false }),
            Vec::new()
        );
        assert_eq!(session.phase(), Phase::DiscoveringCharacteristics);
    }

    #[test]
    fn stop_on_fresh_session_is_a_no_op() {
        let mut session = Session::new();
        assert_eq!(session.handle(Event::StopRequested), Vec::new());
        assert_eq!(session.phase(), Phase::Disconnected);
        assert_eq!(session.bpm(), 0);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut session = streaming_session();
        session.handle(Event::Measurement(vec![0x00, 0x55]));

        assert_eq!(
            session.handle(Event::StopRequested),
            vec![Command::Disconnect, Command::PublishBpm(0)]
        );
        assert_eq!(session.handle(Event::StopRequested), Vec::new());
        assert_eq!(session.phase(), Phase::Disconnected);
        assert_eq!(session.bpm(), 0);
    }

    #[test]
    fn stop_while_scanning_cancels_the_scan() {
        let mut session = Session::new();
        session.handle(Event::AdapterReady);
        assert_eq!(session.handle(Event::StopRequested), vec![Command::StopScan]);
        assert_eq!(session.phase(), Phase::Disconnected);
    }

    #[test]
    fn events_after_stop_are_ignored() {
        let mut session = streaming_session();
        session.handle(Event::StopRequested);

        assert_eq!(session.handle(Event::Measurement(vec![0x00, 0x50])), Vec::new());
        assert_eq!(session.handle(Event::AdapterReady), Vec::new());
        assert_eq!(session.bpm(), 0);
        assert_eq!(session.phase(), Phase::Disconnected);
    }

    #[test]
    fn malformed_frame_keeps_previous_reading() {
        let mut session = streaming_session();
        session.handle(Event::Measurement(vec![0x00, 0x48]));

        // declared u16 form but missing the high byte
        assert_eq!(session.handle(Event::Measurement(vec![0x01, 0x50])), Vec::new());
        assert_eq!(session.bpm(), 72);
        assert_eq!(session.phase(), Phase::Streaming);
    }

    #[test]
    fn measurements_before_streaming_are_ignored() {
        let mut session = Session::new();
        session.handle(Event::AdapterReady);

        assert_eq!(session.handle(Event::Measurement(vec![0x00, 0x48])), Vec::new());
        assert_eq!(session.bpm(), 0);
        assert_eq!(session.phase(), Phase::Scanning);
    }

    #[test]
    fn step_failure_halts_without_commands() {
        let mut session = Session::new();
        session.handle(Event::AdapterReady);
        session.handle(Event::PeripheralFound);

        assert_eq!(
            session.handle(Event::StepFailed(SessionError::ConnectionFailed)),
            Vec::new()
        );
        assert_eq!(session.phase(), Phase::Connecting);
        // stop still works after a halt
        assert_eq!(session.handle(Event::StopRequested), vec![Command::Disconnect]);
    }
}

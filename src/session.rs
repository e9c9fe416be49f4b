use std::collections::VecDeque;
use std::pin::Pin;

use anyhow::{Context, Result};
use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral, ScanFilter,
    ValueNotification,
};
use btleplug::platform::{Adapter, Manager, Peripheral as PlatformPeripheral, PeripheralId};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SessionError;
use crate::machine::{Command, Event, Phase, Session};
use crate::resolver;
use crate::signal::{GuiSignal, SessionSignal};

type CentralEventStream = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;
type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// Owns the adapter for the life of the process and runs one sensor session
/// per workout. A stopped session is never reused; the next start request
/// gets a fresh `ActiveSession` with a fresh state machine.
pub struct PulseManager {
    tx_to_gui: Sender<SessionSignal>,
    rx_from_gui: Receiver<GuiSignal>,
    shutdown: CancellationToken,
}

impl PulseManager {
    pub fn new(
        tx_to_gui: Sender<SessionSignal>,
        rx_from_gui: Receiver<GuiSignal>,
        shutdown: CancellationToken,
    ) -> Self {
        PulseManager {
            tx_to_gui,
            rx_from_gui,
            shutdown,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let adapter = match acquire_adapter().await {
            Ok(adapter) => Some(adapter),
            Err(err) => {
                // no adapter means sessions stall in Idle, nothing more
                warn!("no usable bluetooth adapter: {err:#}");
                None
            }
        };

        loop {
            let signal = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                signal = self.rx_from_gui.recv() => signal,
            };
            match signal {
                Some(GuiSignal::StartWorkout) => {}
                Some(GuiSignal::StopWorkout) => continue,
                None => return Ok(()),
            }

            info!("workout started, opening sensor session");
            let mut session = ActiveSession::new(adapter.clone(), self.tx_to_gui.clone());
            if let Err(err) = session.run(&mut self.rx_from_gui, &self.shutdown).await {
                error!("sensor session ended abnormally: {err:#}");
            }
            session.tear_down().await;
            info!("sensor session closed");
        }
    }
}

async fn acquire_adapter() -> Result<Adapter> {
    let manager = Manager::new().await.context("bluetooth manager init failed")?;
    let adapter_list = manager.adapters().await.context("adapter enumeration failed")?;

    for adapter in adapter_list.iter() {
        let label = adapter
            .adapter_info()
            .await
            .unwrap_or_else(|_| String::from("unnamed adapter"));
        debug!("adapter present: {label}");
    }

    adapter_list
        .into_iter()
        .next()
        .context("no bluetooth adapter present")
}

/// One monitoring attempt. Translates btleplug central events and
/// notification frames into machine events and executes the machine's
/// commands; a follow-up GATT request is only issued once the completion of
/// the previous one has been observed.
struct ActiveSession {
    adapter: Option<Adapter>,
    tx_to_gui: Sender<SessionSignal>,
    machine: Session,
    peripheral: Option<PlatformPeripheral>,
    characteristic: Option<Characteristic>,
    pending_notifications: Option<NotificationStream>,
}

impl ActiveSession {
    fn new(adapter: Option<Adapter>, tx_to_gui: Sender<SessionSignal>) -> Self {
        ActiveSession {
            adapter,
            tx_to_gui,
            machine: Session::new(),
            peripheral: None,
            characteristic: None,
            pending_notifications: None,
        }
    }

    async fn run(
        &mut self,
        rx_from_gui: &mut Receiver<GuiSignal>,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let mut central_events: Option<CentralEventStream> = match &self.adapter {
            Some(adapter) => Some(adapter.events().await.context("adapter event stream")?),
            None => None,
        };

        // the event stream is open before the state probe so a power-on
        // racing the probe is not lost
        if let Some(adapter) = &self.adapter {
            match adapter.adapter_state().await {
                Ok(CentralState::PoweredOn) => self.dispatch(Event::AdapterReady).await,
                Ok(state) => info!(?state, "waiting for the adapter to power on"),
                Err(err) => warn!("could not read adapter state: {err}"),
            }
        }

        let mut notifications: Option<NotificationStream> = None;
        while self.machine.phase() != Phase::Disconnected {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.dispatch(Event::StopRequested).await;
                }
                signal = rx_from_gui.recv() => match signal {
                    Some(GuiSignal::StopWorkout) | None => {
                        self.dispatch(Event::StopRequested).await;
                    }
                    Some(GuiSignal::StartWorkout) => {
                        debug!("start requested while a session is active, ignored");
                    }
                },
                event = next_central_event(&mut central_events) => match event {
                    Some(event) => self.on_central_event(event).await,
                    None => {
                        warn!("central event stream ended");
                        central_events = None;
                    }
                },
                notification = next_notification(&mut notifications) => match notification {
                    Some(notification) => self.on_notification(notification).await,
                    None => {
                        warn!("notification stream ended, sensor dropped the link");
                        notifications = None;
                        self.dispatch(Event::StepFailed(SessionError::ConnectionFailed)).await;
                    }
                },
            }

            if let Some(stream) = self.pending_notifications.take() {
                notifications = Some(stream);
            }
        }
        Ok(())
    }

    async fn on_central_event(&mut self, event: CentralEvent) {
        match event {
            CentralEvent::StateUpdate(state) => {
                debug!(?state, "adapter state changed");
                if state == CentralState::PoweredOn && self.machine.phase() == Phase::Idle {
                    self.dispatch(Event::AdapterReady).await;
                }
            }
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                self.on_device_seen(id).await;
            }
            CentralEvent::DeviceDisconnected(id) => {
                let ours = self
                    .peripheral
                    .as_ref()
                    .is_some_and(|peripheral| peripheral.id() == id);
                if ours && self.machine.phase() != Phase::Disconnected {
                    warn!("sensor disconnected on its own");
                    self.dispatch(Event::StepFailed(SessionError::ConnectionFailed)).await;
                }
            }
            _ => {}
        }
    }

    async fn on_device_seen(&mut self, id: PeripheralId) {
        // only the first match during an active scan is targeted
        if self.machine.phase() != Phase::Scanning || self.peripheral.is_some() {
            return;
        }
        let Some(adapter) = self.adapter.clone() else {
            return;
        };
        match adapter.peripheral(&id).await {
            Ok(peripheral) => {
                let name = get_peripheral_name(&peripheral)
                    .await
                    .unwrap_or_else(|| String::from("(unnamed sensor)"));
                info!("found heart rate sensor: {name}");
                let _ = self.tx_to_gui.send(SessionSignal::SensorFound(name)).await;
                self.peripheral = Some(peripheral);
                self.dispatch(Event::PeripheralFound).await;
            }
            Err(err) => warn!("could not resolve discovered peripheral: {err}"),
        }
    }

    async fn on_notification(&mut self, notification: ValueNotification) {
        if notification.uuid != resolver::HEART_RATE_MEASUREMENT_UUID {
            return;
        }
        self.dispatch(Event::Measurement(notification.value)).await;
    }

    /// Run one event through the machine, executing every command it emits.
    /// Command completions feed back in as further events until the machine
    /// settles.
    async fn dispatch(&mut self, event: Event) {
        let phase_before = self.machine.phase();

        let mut queue: VecDeque<Command> = self.machine.handle(event).into();
        while let Some(command) = queue.pop_front() {
            if let Some(completion) = self.exec(command).await {
                queue.extend(self.machine.handle(completion));
            }
        }

        let phase_after = self.machine.phase();
        if phase_before != phase_after {
            debug!(?phase_before, ?phase_after, "session phase changed");
            let _ = self.tx_to_gui.send(SessionSignal::Phase(phase_after)).await;
        }
    }

    async fn exec(&mut self, command: Command) -> Option<Event> {
        match command {
            Command::StartScan => {
                let Some(adapter) = &self.adapter else {
                    return Some(Event::StepFailed(SessionError::AdapterUnavailable));
                };
                let filter = ScanFilter {
                    services: vec![resolver::HEART_RATE_SERVICE_UUID],
                };
                match adapter.start_scan(filter).await {
                    Ok(()) => {
                        info!("scanning for heart rate sensors");
                        None
                    }
                    Err(err) => {
                        error!("could not start scan: {err}");
                        Some(Event::StepFailed(SessionError::AdapterUnavailable))
                    }
                }
            }
            Command::StopScan => {
                if let Some(adapter) = &self.adapter {
                    if let Err(err) = adapter.stop_scan().await {
                        warn!("could not stop scan: {err}");
                    }
                }
                None
            }
            Command::Connect => {
                let Some(peripheral) = self.peripheral.clone() else {
                    return Some(Event::StepFailed(SessionError::ConnectionFailed));
                };
                match peripheral.connect().await {
                    Ok(()) => {
                        info!("connected to sensor");
                        Some(Event::Connected)
                    }
                    Err(err) => {
                        error!("connection failed: {err}");
                        Some(Event::StepFailed(SessionError::ConnectionFailed))
                    }
                }
            }
            Command::DiscoverServices => {
                let Some(peripheral) = self.peripheral.clone() else {
                    return Some(Event::StepFailed(SessionError::DiscoveryFailed));
                };
                match resolver::discover_heart_rate_service(&peripheral).await {
                    Ok(heart_rate_present) => {
                        Some(Event::ServicesResolved { heart_rate_present })
                    }
                    Err(err) => Some(Event::StepFailed(err)),
                }
            }
            Command::ResolveCharacteristic => {
                let Some(peripheral) = self.peripheral.clone() else {
                    return Some(Event::StepFailed(SessionError::DiscoveryFailed));
                };
                self.characteristic = resolver::find_measurement_characteristic(&peripheral);
                Some(Event::CharacteristicResolved {
                    found: self.characteristic.is_some(),
                })
            }
            Command::Subscribe => {
                let (Some(peripheral), Some(characteristic)) =
                    (self.peripheral.clone(), self.characteristic.clone())
                else {
                    return Some(Event::StepFailed(SessionError::SubscriptionFailed));
                };
                if let Err(err) = peripheral.subscribe(&characteristic).await {
                    error!("could not enable notifications: {err}");
                    return Some(Event::StepFailed(SessionError::SubscriptionFailed));
                }
                match peripheral.notifications().await {
                    Ok(stream) => {
                        info!("heart rate notifications enabled");
                        self.pending_notifications = Some(stream);
                        Some(Event::Subscribed)
                    }
                    Err(err) => {
                        error!("could not open notification stream: {err}");
                        Some(Event::StepFailed(SessionError::SubscriptionFailed))
                    }
                }
            }
            Command::PublishBpm(bpm) => {
                let _ = self.tx_to_gui.send(SessionSignal::HeartRate { bpm }).await;
                None
            }
            Command::Disconnect => {
                self.tear_down().await;
                None
            }
        }
    }

    /// Release everything this session acquired. Safe to call when nothing
    /// was ever acquired, and safe to call twice.
    async fn tear_down(&mut self) {
        self.pending_notifications = None;
        if let (Some(peripheral), Some(characteristic)) =
            (self.peripheral.clone(), self.characteristic.take())
        {
            if let Err(err) = peripheral.unsubscribe(&characteristic).await {
                debug!("unsubscribe during teardown failed: {err}");
            }
        }
        if let Some(peripheral) = self.peripheral.take() {
            if let Ok(true) = peripheral.is_connected().await {
                match peripheral.disconnect().await {
                    Ok(()) => info!("disconnected from sensor"),
                    Err(err) => warn!("disconnect during teardown failed: {err}"),
                }
            }
        }
    }
}

async fn next_central_event(events: &mut Option<CentralEventStream>) -> Option<CentralEvent> {
    match events {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn next_notification(
    notifications: &mut Option<NotificationStream>,
) -> Option<ValueNotification> {
    match notifications {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn get_peripheral_name(peripheral: &PlatformPeripheral) -> Option<String> {
    let Ok(Some(properties)) = peripheral.properties().await else {
        return None;
    };
    properties.local_name
}

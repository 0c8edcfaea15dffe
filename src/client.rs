//! `EspClient`: the typed request/response/subscribe surface.
//!
//! Thin adapter over the session and dispatcher — no framing or routing
//! logic lives here. Each request method builds the packet for the current
//! bus variant, registers the pending entry, writes through the session's
//! serialized writer and awaits the typed outcome.
//!
//! Reconnection is a caller policy: on `ConnectionLost`, call
//! [`EspClient::reconnect`] with a fresh transport. The dispatcher and all
//! of its subscriptions survive the swap.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use crate::data::{
    AlertTable, DisplayData, SavvyStatus, SweepDefinition, SweepSection, UserSettings,
    VolumeSettings, USER_BYTES_LEN,
};
use crate::dispatch::{
    CorrelationKey, MalformedReport, PacketDispatcher, PendingKind, PendingTicket, RequestOutcome,
    SectionSetAssembler, SweepSetAssembler,
};
use crate::error::{EspError, Result};
use crate::packets::{version_value, Packet, RequestPacket, ResponseBody, ResponsePacket};
use crate::protocol::{DeviceId, PacketId, V1Mode};
use crate::session::{
    ConnectionEvent, ConnectionSession, ConnectionState, SessionConfig, SessionStats,
};
use crate::transport::{Transport, TransportKind};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request deadline for a matching response.
    pub request_timeout: Duration,
    /// Session tuning.
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            session: SessionConfig::default(),
        }
    }
}

/// Client for one V1 device over one transport.
pub struct EspClient {
    session: ConnectionSession,
    dispatcher: Arc<PacketDispatcher>,
    config: ClientConfig,
}

impl EspClient {
    /// Connect over `transport` and start the protocol engine.
    pub async fn connect(transport: impl Transport + 'static, config: ClientConfig) -> Result<Self> {
        let dispatcher = Arc::new(PacketDispatcher::new());
        let session = ConnectionSession::connect(
            Box::new(transport),
            dispatcher.clone(),
            config.session.clone(),
        )
        .await?;
        Ok(Self {
            session,
            dispatcher,
            config,
        })
    }

    /// Replace a dead session with a fresh transport. Subscriptions and
    /// dispatcher state carry over.
    pub async fn reconnect(&mut self, transport: impl Transport + 'static) -> Result<()> {
        self.session.disconnect().await;
        self.session = ConnectionSession::connect(
            Box::new(transport),
            self.dispatcher.clone(),
            self.config.session.clone(),
        )
        .await?;
        Ok(())
    }

    /// Tear the connection down. Pending requests fail with
    /// `ConnectionLost`.
    pub async fn disconnect(&self) {
        self.session.disconnect().await;
    }

    // Connection observation ----------------------------------------------

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.session.state_watch()
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.session.kind()
    }

    /// Last detected V1 variant.
    pub fn v1_type(&self) -> DeviceId {
        self.session.v1_type()
    }

    /// True once the bus has been identified as a legacy-mode V1.
    pub fn is_legacy(&self) -> bool {
        self.v1_type() == DeviceId::ValentineOneLegacy
    }

    pub fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.session.events()
    }

    pub fn no_data_reports(&self) -> broadcast::Receiver<Duration> {
        self.session.no_data_reports()
    }

    pub fn session_stats(&self) -> SessionStats {
        self.session.stats()
    }

    // Subscriptions -------------------------------------------------------

    /// Fully assembled alert tables (enable the stream with
    /// [`EspClient::start_alert_data`]).
    pub fn alert_tables(&self) -> broadcast::Receiver<AlertTable> {
        self.dispatcher.alert_tables()
    }

    /// Display-data notifications.
    pub fn display_data(&self) -> broadcast::Receiver<DisplayData> {
        self.dispatcher.display_data()
    }

    /// Busy-id reports.
    pub fn busy_notifications(&self) -> broadcast::Receiver<Vec<u8>> {
        self.dispatcher.busy()
    }

    /// Every decoded packet, for generic listeners.
    pub fn packets(&self) -> broadcast::Receiver<Packet> {
        self.dispatcher.packets()
    }

    /// Malformed-payload reports.
    pub fn malformed_reports(&self) -> broadcast::Receiver<MalformedReport> {
        self.dispatcher.malformed()
    }

    // Identification ------------------------------------------------------

    /// Read the V1's version string.
    pub async fn request_version(&self) -> Result<String> {
        self.request_device_version(self.v1_dest()).await
    }

    /// Read the V1's version as its numeric value.
    pub async fn request_version_value(&self) -> Result<f64> {
        let version = self.request_version().await?;
        version_value(&version).ok_or(EspError::InvalidData("unparseable version string"))
    }

    /// Read any bus device's version string.
    pub async fn request_device_version(&self, device: DeviceId) -> Result<String> {
        let request = RequestPacket::version(self.v1_type(), device);
        let response = self.request_single(request, PacketId::RespVersion).await?;
        match response.body {
            ResponseBody::Version(version) => Ok(version),
            _ => Err(EspError::InvalidData("unexpected response body")),
        }
    }

    /// Read the V1's serial number.
    pub async fn request_serial_number(&self) -> Result<String> {
        let request = RequestPacket::serial_number(self.v1_type(), self.v1_dest());
        let response = self
            .request_single(request, PacketId::RespSerialNumber)
            .await?;
        match response.body {
            ResponseBody::SerialNumber(serial) => Ok(serial),
            _ => Err(EspError::InvalidData("unexpected response body")),
        }
    }

    // Settings ------------------------------------------------------------

    /// Read the six raw user bytes.
    pub async fn request_user_bytes(&self) -> Result<[u8; USER_BYTES_LEN]> {
        let request = RequestPacket::user_bytes(self.v1_type());
        let response = self.request_single(request, PacketId::RespUserBytes).await?;
        match response.body {
            ResponseBody::UserBytes(bytes) => Ok(bytes),
            _ => Err(EspError::InvalidData("unexpected response body")),
        }
    }

    /// Read user settings, decoded under the firmware's own bit layout
    /// (version pre-flight, then user bytes).
    pub async fn request_user_settings(&self) -> Result<UserSettings> {
        let version = self.request_version_value().await?;
        let bytes = self.request_user_bytes().await?;
        Ok(UserSettings::for_version(version, bytes))
    }

    /// Write the six user bytes.
    pub async fn write_user_bytes(&self, bytes: &[u8; USER_BYTES_LEN]) -> Result<()> {
        self.send(RequestPacket::write_user_bytes(self.v1_type(), bytes))
            .await
    }

    /// Restore a device to factory defaults.
    pub async fn request_factory_default(&self, device: DeviceId) -> Result<()> {
        self.send(RequestPacket::factory_default(self.v1_type(), device))
            .await
    }

    // Sweeps --------------------------------------------------------------

    /// Read the highest valid sweep slot index.
    pub async fn request_max_sweep_index(&self) -> Result<u8> {
        let request = RequestPacket::max_sweep_index(self.v1_type());
        let response = self
            .request_single(request, PacketId::RespMaxSweepIndex)
            .await?;
        match response.body {
            ResponseBody::MaxSweepIndex(index) => Ok(index),
            _ => Err(EspError::InvalidData("unexpected response body")),
        }
    }

    /// Read every custom sweep definition. The set size is unknown until
    /// the max-sweep-index pre-flight answers; the definitions then stream
    /// in as one response per slot, reassembled in slot order.
    pub async fn request_all_sweep_definitions(&self) -> Result<Vec<SweepDefinition>> {
        let count = self.request_max_sweep_index().await? as usize + 1;
        let request = RequestPacket::all_sweep_definitions(self.v1_type());
        let outcome = self
            .submit(
                request,
                PacketId::RespSweepDefinition,
                PendingKind::SweepSet(SweepSetAssembler::new(count)),
            )
            .await?;
        match outcome {
            RequestOutcome::SweepSet(set) => Ok(set),
            _ => Err(EspError::InvalidData("unexpected request outcome")),
        }
    }

    /// Read the factory-default sweep definitions (4.1000+ firmware).
    pub async fn request_default_sweep_definitions(&self) -> Result<Vec<SweepDefinition>> {
        let count = self.request_max_sweep_index().await? as usize + 1;
        let request = RequestPacket::default_sweep_definitions(self.v1_type());
        let outcome = self
            .submit(
                request,
                PacketId::RespDefaultSweepDefinitions,
                PendingKind::SweepSet(SweepSetAssembler::new(count)),
            )
            .await?;
        match outcome {
            RequestOutcome::SweepSet(set) => Ok(set),
            _ => Err(EspError::InvalidData("unexpected request outcome")),
        }
    }

    /// Write a batch of sweep definitions. The commit bit rides on the
    /// final definition; the single write-result response settles the
    /// whole batch.
    pub async fn write_sweep_definitions(
        &self,
        mut sweeps: Vec<SweepDefinition>,
    ) -> Result<()> {
        if sweeps.is_empty() {
            return Err(EspError::InvalidData("empty sweep batch"));
        }
        let last = sweeps.len() - 1;
        sweeps[last].commit = true;

        let v1_type = self.v1_type();
        let ticket = self.register(
            PacketId::RespSweepWriteResult,
            PacketId::ReqWriteSweepDefinition,
            PendingKind::Single,
        )?;

        for definition in &sweeps {
            let request = RequestPacket::write_sweep_definition(v1_type, definition);
            if let Err(e) = self.session.write_frame(&request.frame).await {
                self.dispatcher.cancel(ticket.key);
                return Err(e);
            }
        }

        let outcome = self
            .dispatcher
            .wait(ticket, self.config.request_timeout)
            .await?;
        match PendingTicket::into_packet(outcome)?.body {
            ResponseBody::SweepWriteResult(0) => Ok(()),
            ResponseBody::SweepWriteResult(bad_index) => {
                Err(EspError::SweepWriteFailed(bad_index))
            }
            _ => Err(EspError::InvalidData("unexpected response body")),
        }
    }

    /// Ask the V1 to revert to its default sweeps.
    pub async fn request_default_sweeps(&self) -> Result<()> {
        self.send(RequestPacket::default_sweeps(self.v1_type())).await
    }

    /// Read the permitted sweep sections.
    pub async fn request_sweep_sections(&self) -> Result<Vec<SweepSection>> {
        let request = RequestPacket::sweep_sections(self.v1_type());
        let outcome = self
            .submit(
                request,
                PacketId::RespSweepSections,
                PendingKind::SectionSet(SectionSetAssembler::new()),
            )
            .await?;
        match outcome {
            RequestOutcome::SectionSet(sections) => Ok(sections),
            _ => Err(EspError::InvalidData("unexpected request outcome")),
        }
    }

    // Display and audio ---------------------------------------------------

    /// Turn the main display on or off.
    pub async fn set_main_display(&self, on: bool) -> Result<()> {
        self.send(RequestPacket::main_display(self.v1_type(), on)).await
    }

    /// Mute or unmute the current alerts.
    pub async fn set_mute(&self, muted: bool) -> Result<()> {
        self.send(RequestPacket::mute(self.v1_type(), muted)).await
    }

    /// Change the operating mode.
    pub async fn change_mode(&self, mode: V1Mode) -> Result<()> {
        self.send(RequestPacket::change_mode(self.v1_type(), mode)).await
    }

    /// Read main and muted volume (4.1026+ firmware).
    pub async fn request_current_volume(&self) -> Result<VolumeSettings> {
        let request = RequestPacket::current_volume(self.v1_type());
        let response = self
            .request_single(request, PacketId::RespCurrentVolume)
            .await?;
        match response.body {
            ResponseBody::CurrentVolume(volume) => Ok(volume),
            _ => Err(EspError::InvalidData("unexpected response body")),
        }
    }

    /// Write main and muted volume.
    pub async fn write_volume(&self, volume: VolumeSettings) -> Result<()> {
        self.send(RequestPacket::write_volume(self.v1_type(), volume))
            .await
    }

    /// Abort the audio delay after a mode change.
    pub async fn abort_audio_delay(&self) -> Result<()> {
        self.send(RequestPacket::abort_audio_delay(self.v1_type())).await
    }

    // Alert data ----------------------------------------------------------

    /// Ask the V1 to stream alert data (delivered on
    /// [`EspClient::alert_tables`]).
    pub async fn start_alert_data(&self) -> Result<()> {
        self.send(RequestPacket::start_alert_data(self.v1_type())).await
    }

    /// Stop the alert-data stream.
    pub async fn stop_alert_data(&self) -> Result<()> {
        self.send(RequestPacket::stop_alert_data(self.v1_type())).await
    }

    // Status --------------------------------------------------------------

    /// Read the battery voltage in volts.
    pub async fn request_battery_voltage(&self) -> Result<f32> {
        let request = RequestPacket::battery_voltage(self.v1_type());
        let response = self
            .request_single(request, PacketId::RespBatteryVoltage)
            .await?;
        match response.body {
            ResponseBody::BatteryVoltage { volts, tenths } => {
                Ok(f32::from(volts) + f32::from(tenths) / 10.0)
            }
            _ => Err(EspError::InvalidData("unexpected response body")),
        }
    }

    /// Read the SAVVY accessory status.
    pub async fn request_savvy_status(&self) -> Result<SavvyStatus> {
        let request = RequestPacket::savvy_status(self.v1_type());
        let response = self
            .request_single(request, PacketId::RespSavvyStatus)
            .await?;
        match response.body {
            ResponseBody::SavvyStatus(status) => Ok(status),
            _ => Err(EspError::InvalidData("unexpected response body")),
        }
    }

    /// Read the vehicle speed the SAVVY observes.
    pub async fn request_vehicle_speed(&self) -> Result<u8> {
        let request = RequestPacket::vehicle_speed(self.v1_type());
        let response = self
            .request_single(request, PacketId::RespVehicleSpeed)
            .await?;
        match response.body {
            ResponseBody::VehicleSpeed(speed) => Ok(speed),
            _ => Err(EspError::InvalidData("unexpected response body")),
        }
    }

    /// Override the SAVVY's speed thumbwheel.
    pub async fn override_thumbwheel(&self, speed: u8) -> Result<()> {
        self.send(RequestPacket::override_thumbwheel(self.v1_type(), speed))
            .await
    }

    /// Enable or disable SAVVY unmuting.
    pub async fn set_savvy_unmute(&self, enabled: bool) -> Result<()> {
        self.send(RequestPacket::savvy_unmute_enable(self.v1_type(), enabled))
            .await
    }

    // Plumbing ------------------------------------------------------------

    fn v1_dest(&self) -> DeviceId {
        let v1_type = self.v1_type();
        if v1_type.is_v1() {
            v1_type
        } else {
            DeviceId::ValentineOneNoChecksum
        }
    }

    fn register(
        &self,
        response_id: PacketId,
        request_id: PacketId,
        kind: PendingKind,
    ) -> Result<PendingTicket> {
        self.dispatcher.register(
            CorrelationKey::new(response_id.to_byte(), self.v1_dest()),
            request_id.to_byte(),
            kind,
        )
    }

    /// Register, write, await: the common request path.
    async fn submit(
        &self,
        request: RequestPacket,
        response_id: PacketId,
        kind: PendingKind,
    ) -> Result<RequestOutcome> {
        let ticket = self.dispatcher.register(
            CorrelationKey::new(response_id.to_byte(), request.destination()),
            request.frame.packet_id_byte(),
            kind,
        )?;
        if let Err(e) = self.session.write_frame(&request.frame).await {
            self.dispatcher.cancel(ticket.key);
            return Err(e);
        }
        self.dispatcher.wait(ticket, self.config.request_timeout).await
    }

    async fn request_single(
        &self,
        request: RequestPacket,
        response_id: PacketId,
    ) -> Result<ResponsePacket> {
        let outcome = self.submit(request, response_id, PendingKind::Single).await?;
        PendingTicket::into_packet(outcome)
    }

    /// Fire-and-forget requests: complete once the write is acknowledged.
    async fn send(&self, request: RequestPacket) -> Result<()> {
        self.session.write_frame(&request.frame).await
    }
}

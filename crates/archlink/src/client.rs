//! The connection manager and the client facade built on it.
//!
//! A [`Client`] owns the dispatch bus, the correlator, the session cache
//! and the data storage engine, and drives one connection at a time:
//!
//! ```text
//!          connect()
//!              │
//!   open (wss, then ws on Auto) ──fail──→ Disconnected
//!              │
//!   spawn reader + writer tasks
//!              │
//!   await RoomInfo ─→ [GetDataPackage] ─→ Connect ─→ Connected | ConnectionRefused
//!              │                                          │
//!          Established                               Disconnected
//! ```
//!
//! Every transition into `Disconnected` runs the same shutdown path:
//! close the channel, reject pending requests, reset the session cache
//! and the data storage engine, emit the disconnected event once.

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::sync::{Arc, Weak};

use archlink_dispatch::{
    Correlator, DispatchBus, Listeners, Outbound, RandomTokens,
    SubscriptionId, TokenGenerator,
};
use archlink_protocol::{
    ClientMessage, ClientStatus, Connect, Connected, DataPackagePayload,
    LocationId, MessageKind, NetworkItem, ServerMessage, SlotId,
};
use archlink_session::{ConnectionPhase, Session, SessionCache};
use archlink_storage::DataStorage;
use archlink_transport::{
    AddressError, Connection, Connector, ServerAddress, TransportError,
    WebSocketConnector,
};
use parking_lot::ReentrantMutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::link::Link;
use crate::{ClientError, ClientOptions};

/// Why the client dropped to `Disconnected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// [`Client::disconnect`], a new `connect`, or the client was dropped.
    Requested,
    /// The server closed the channel.
    Closed,
    /// The channel failed.
    TransportError(String),
    /// The server refused authentication.
    Refused,
    /// `connect` failed before authenticating.
    Failed(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("disconnect requested"),
            Self::Closed => f.write_str("closed by server"),
            Self::TransportError(e) => write!(f, "transport error: {e}"),
            Self::Refused => f.write_str("authentication refused"),
            Self::Failed(e) => write!(f, "connect failed: {e}"),
        }
    }
}

/// Recipients of a [`Client::bounce`].
///
/// The server delivers to the union of every listed game, slot and tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BounceTarget {
    pub games: Option<Vec<String>>,
    pub slots: Option<Vec<SlotId>>,
    pub tags: Option<Vec<String>>,
}

impl BounceTarget {
    #[must_use]
    pub fn games<I: IntoIterator<Item = S>, S: Into<String>>(mut self, games: I) -> Self {
        self.games = Some(games.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn slots(mut self, slots: impl IntoIterator<Item = SlotId>) -> Self {
        self.slots = Some(slots.into_iter().collect());
        self
    }

    #[must_use]
    pub fn tags<I: IntoIterator<Item = S>, S: Into<String>>(mut self, tags: I) -> Self {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }
}

/// Components shared between the client handle and its connection tasks.
struct Shared {
    bus: Arc<DispatchBus>,
    correlator: Arc<Correlator>,
    link: Arc<Link>,
    cache: Arc<SessionCache>,
    storage: Arc<DataStorage>,
    disconnected: Listeners<DisconnectReason>,
    options: ClientOptions,
    /// Sent in every `Connect` of this client.
    uuid: String,
    /// Held while a frame is dispatched and while state is reset, so a
    /// reset never lands in the middle of a frame. Reentrant because
    /// listeners may disconnect from inside a dispatch.
    dispatch: ReentrantMutex<()>,
}

impl Shared {
    /// The single path into `Disconnected`.
    ///
    /// With `Some(generation)`, only that connection attempt is torn down.
    /// Returns `false` if there was nothing to tear down.
    fn shutdown(&self, generation: Option<u64>, reason: DisconnectReason) -> bool {
        let rejected = {
            let _dispatch = self.dispatch.lock();
            if !self.link.close(generation) {
                return false;
            }
            let rejected = self.correlator.cancel_all();
            self.cache.reset();
            self.storage.reset();
            rejected
        };

        tracing::info!(%reason, rejected, "disconnected");
        self.disconnected.emit(&reason);
        true
    }
}

/// Tears the attempt down if `connect` is dropped before finishing.
struct Attempt<'a> {
    shared: &'a Shared,
    generation: u64,
    finished: bool,
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.shutdown(
                Some(self.generation),
                DisconnectReason::Failed("connect cancelled".into()),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A client for one slot on a multiworld server.
///
/// ```rust,no_run
/// use archlink::prelude::*;
///
/// # async fn run() -> Result<(), ClientError> {
/// let client = Client::new(ClientOptions::default().with_tags(["AP"]));
/// let connected = client.connect("localhost", "Alice", "ExampleGame").await?;
/// println!("slot {} on team {}", connected.slot, connected.team);
///
/// client.check_locations([1, 2])?;
/// let total = client
///     .data_storage()
///     .prepare("counter", 0)?
///     .add(5)
///     .commit(true)
///     .await?;
/// println!("counter is now {total:?}");
/// # Ok(())
/// # }
/// ```
///
/// All methods take `&self`; share the client behind an `Arc` to use it
/// from several tasks.
pub struct Client<C: Connector = WebSocketConnector> {
    connector: C,
    shared: Arc<Shared>,
}

impl Client<WebSocketConnector> {
    /// Creates a client that connects over WebSocket.
    pub fn new(options: ClientOptions) -> Self {
        Self::with_connector(WebSocketConnector, options)
    }
}

impl<C: Connector> Client<C> {
    /// Creates a client with a custom connector.
    pub fn with_connector(connector: C, options: ClientOptions) -> Self {
        Self::with_token_generator(connector, options, Arc::new(RandomTokens))
    }

    /// Creates a client with a custom connector and correlation token
    /// source.
    pub fn with_token_generator(
        connector: C,
        options: ClientOptions,
        tokens: Arc<dyn TokenGenerator>,
    ) -> Self {
        let bus = Arc::new(DispatchBus::new());
        let correlator = Arc::new(Correlator::with_tokens(&bus, tokens));
        let link = Arc::new(Link::new(Arc::clone(&bus)));

        let cache = Arc::new(SessionCache::new());
        cache.attach(&bus);

        let outbound: Arc<dyn Outbound> = Arc::clone(&link) as Arc<dyn Outbound>;
        let storage = Arc::new(DataStorage::new(
            outbound,
            Arc::clone(&correlator),
            options.reply_timeout,
        ));
        storage.attach(&bus);

        install_resync(&cache, &link);

        let uuid = options
            .uuid
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            connector,
            shared: Arc::new(Shared {
                bus,
                correlator,
                link,
                cache,
                storage,
                disconnected: Listeners::new(),
                options,
                uuid,
                dispatch: ReentrantMutex::new(()),
            }),
        }
    }

    // -- Lifecycle ---------------------------------------------------------

    /// Connects to `address` and authenticates as `slot` playing `game`.
    ///
    /// An established session is disconnected first. On any failure the
    /// client is left `Disconnected` with an empty cache.
    ///
    /// # Errors
    /// - [`ClientError::Address`]: `address` doesn't parse; nothing changes
    /// - [`ClientError::Transport`]: no candidate URL opened
    /// - [`ClientError::Refused`]: the server rejected the slot
    /// - [`ClientError::Correlation`]: no room info or authentication
    ///   reply in time ([`ClientError::is_timeout`]), or the channel closed
    ///   during the handshake
    /// - [`ClientError::ConnectInProgress`]: another `connect` hasn't
    ///   finished yet; it is left alone
    pub async fn connect(
        &self,
        address: &str,
        slot: &str,
        game: &str,
    ) -> Result<Connected, ClientError> {
        let address: ServerAddress = address.parse()?;

        match self.shared.link.current() {
            (ConnectionPhase::Connecting | ConnectionPhase::AwaitingAuthentication, _) => {
                return Err(ClientError::ConnectInProgress);
            }
            (ConnectionPhase::Established, current) => {
                self.shared
                    .shutdown(Some(current), DisconnectReason::Requested);
            }
            (ConnectionPhase::Disconnected, _) => {}
        }
        let generation = self
            .shared
            .link
            .begin_connecting()
            .ok_or(ClientError::ConnectInProgress)?;
        tracing::info!(%address, slot, game, "connecting");

        let mut attempt = Attempt {
            shared: &self.shared,
            generation,
            finished: false,
        };
        let result = self.handshake(&address, slot, game, generation).await;
        attempt.finished = true;

        if let Err(e) = &result {
            let reason = match e {
                ClientError::Refused(_) => DisconnectReason::Refused,
                other => DisconnectReason::Failed(other.to_string()),
            };
            self.shared.shutdown(Some(generation), reason);
        }
        result
    }

    async fn handshake(
        &self,
        address: &ServerAddress,
        slot: &str,
        game: &str,
        generation: u64,
    ) -> Result<Connected, ClientError> {
        let shared = &self.shared;
        let options = &shared.options;

        let connection = self.open(address).await?;

        // Registered before the reader starts so it can't be missed.
        let room_info =
            shared
                .correlator
                .register(&[MessageKind::RoomInfo], options.reply_timeout, |_| true);
        if !spawn_io(shared, connection, generation) {
            return Err(archlink_dispatch::CorrelationError::Disconnected.into());
        }

        let room = match room_info.wait().await? {
            ServerMessage::RoomInfo(room) => room,
            other => return Err(ClientError::UnexpectedReply(other.kind())),
        };
        tracing::debug!(
            version = %room.version,
            seed = %room.seed_name,
            games = room.games.len(),
            "room info received"
        );

        if options.fetch_data_package && !room.games.is_empty() {
            self.fetch_data_package(room.games.clone()).await?;
        }

        let connect = ClientMessage::Connect(Connect {
            password: options.password.clone(),
            game: game.to_string(),
            name: slot.to_string(),
            uuid: shared.uuid.clone(),
            version: options.version,
            items_handling: options.items_handling,
            tags: options.tags.clone(),
            slot_data: options.slot_data,
        });

        let reply = shared
            .correlator
            .send_and_wait(
                &*shared.link,
                vec![connect],
                &[MessageKind::Connected, MessageKind::ConnectionRefused],
                options.reply_timeout,
                |_| true,
            )
            .await?;

        match reply {
            ServerMessage::Connected(connected) => {
                let session =
                    Session::established(slot, game, connected.team, connected.slot);
                if !shared.link.establish(generation, session) {
                    return Err(archlink_dispatch::CorrelationError::Disconnected.into());
                }
                tracing::info!(
                    slot,
                    game,
                    team = %connected.team,
                    slot_id = %connected.slot,
                    "session established"
                );
                Ok(connected)
            }
            ServerMessage::ConnectionRefused { errors } => {
                tracing::warn!(?errors, "connection refused");
                Err(ClientError::Refused(errors))
            }
            other => Err(ClientError::UnexpectedReply(other.kind())),
        }
    }

    /// Tries each candidate URL in order. Only a failure to open moves on
    /// to the next one.
    async fn open(&self, address: &ServerAddress) -> Result<C::Connection, ClientError> {
        let options = &self.shared.options;
        let timeout = options.connect_timeout;
        let mut last_error = None;

        for url in address.candidates(options.protocol) {
            tracing::debug!(%url, "opening channel");
            let error = match tokio::time::timeout(timeout, self.connector.connect(&url)).await
            {
                Ok(Ok(connection)) => {
                    tracing::info!(%url, id = %connection.id(), "channel open");
                    return Ok(connection);
                }
                Ok(Err(e)) => e,
                Err(_) => TransportError::OpenFailed {
                    url: url.clone(),
                    source: io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("not open after {timeout:?}"),
                    ),
                },
            };
            tracing::warn!(%url, error = %error, "failed to open channel");
            last_error = Some(error);
        }

        Err(match last_error {
            Some(e) => e.into(),
            None => AddressError::Empty.into(),
        })
    }

    /// Disconnects. A no-op when already disconnected.
    pub fn disconnect(&self) {
        self.shared.shutdown(None, DisconnectReason::Requested);
    }

    /// Calls `callback` on every transition into `Disconnected`.
    pub fn on_disconnected<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DisconnectReason) + Send + Sync + 'static,
    {
        self.shared.disconnected.add(callback)
    }

    pub fn remove_disconnected_listener(&self, id: SubscriptionId) -> bool {
        self.shared.disconnected.remove(id)
    }

    // -- Sending -----------------------------------------------------------

    /// Sends `batch` as one frame.
    ///
    /// # Errors
    /// [`ClientError::Send`] if not at least `AwaitingAuthentication` or if
    /// the batch can't be encoded. Nothing is sent in either case.
    pub fn send(&self, batch: Vec<ClientMessage>) -> Result<(), ClientError> {
        self.shared.link.send(batch)?;
        Ok(())
    }

    /// Sends `batch` and waits for the first inbound message of one of
    /// `kinds` accepted by `predicate`, under the reply timeout.
    pub async fn send_and_wait<P>(
        &self,
        batch: Vec<ClientMessage>,
        kinds: &[MessageKind],
        predicate: P,
    ) -> Result<ServerMessage, ClientError>
    where
        P: Fn(&ServerMessage) -> bool + Send + Sync + 'static,
    {
        let shared = &self.shared;
        let reply = shared
            .correlator
            .send_and_wait(
                &*shared.link,
                batch,
                kinds,
                shared.options.reply_timeout,
                predicate,
            )
            .await?;
        Ok(reply)
    }

    /// Reports locations as checked. Fire-and-forget.
    pub fn check_locations(
        &self,
        locations: impl IntoIterator<Item = LocationId>,
    ) -> Result<(), ClientError> {
        self.send(vec![ClientMessage::LocationChecks {
            locations: locations.into_iter().collect(),
        }])
    }

    /// Asks what items sit at `locations`.
    ///
    /// `create_as_hint`: 0 no hint, 1 hint and announce, 2 hint only new
    /// locations. Resolves with the `LocationInfo` whose location set is
    /// exactly the requested one.
    pub async fn scout_locations(
        &self,
        locations: impl IntoIterator<Item = LocationId>,
        create_as_hint: u8,
    ) -> Result<Vec<NetworkItem>, ClientError> {
        let locations: Vec<LocationId> = locations.into_iter().collect();
        let wanted: BTreeSet<LocationId> = locations.iter().copied().collect();

        let reply = self
            .send_and_wait(
                vec![ClientMessage::LocationScouts {
                    locations,
                    create_as_hint,
                }],
                &[MessageKind::LocationInfo],
                move |message| match message {
                    ServerMessage::LocationInfo { locations } => {
                        locations
                            .iter()
                            .map(|item| item.location)
                            .collect::<BTreeSet<_>>()
                            == wanted
                    }
                    _ => false,
                },
            )
            .await?;

        match reply {
            ServerMessage::LocationInfo { locations } => Ok(locations),
            other => Err(ClientError::UnexpectedReply(other.kind())),
        }
    }

    /// Sends a chat message and waits for the server to echo it back.
    ///
    /// # Errors
    /// [`ClientError::Send`] if not `Established` (the echo is matched on
    /// the own slot).
    pub async fn say(&self, text: impl Into<String>) -> Result<(), ClientError> {
        let text = text.into();
        let own_slot = self
            .shared
            .link
            .session()
            .slot
            .ok_or(archlink_dispatch::SendError::NotConnected)?;

        let expected = text.clone();
        self.send_and_wait(
            vec![ClientMessage::Say { text }],
            &[MessageKind::PrintJson],
            move |message| {
                matches!(
                    message,
                    ServerMessage::PrintJson(print)
                        if print.kind.as_deref() == Some("Chat")
                            && print.slot == Some(own_slot)
                            && print.message.as_deref() == Some(expected.as_str())
                )
            },
        )
        .await?;
        Ok(())
    }

    pub fn update_status(&self, status: ClientStatus) -> Result<(), ClientError> {
        self.send(vec![ClientMessage::StatusUpdate { status }])
    }

    /// Replaces the capability tags for the rest of the session.
    pub fn update_tags<I, S>(&self, tags: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send(vec![ClientMessage::ConnectUpdate {
            items_handling: None,
            tags: Some(tags.into_iter().map(Into::into).collect()),
        }])
    }

    pub fn bounce(&self, target: BounceTarget, data: Value) -> Result<(), ClientError> {
        self.send(vec![ClientMessage::Bounce {
            games: target.games,
            slots: target.slots,
            tags: target.tags,
            data,
        }])
    }

    /// Asks the server to resend every received item.
    pub fn sync(&self) -> Result<(), ClientError> {
        self.send(vec![ClientMessage::Sync])
    }

    /// Requests the data package of `games` and waits for it. The session
    /// cache keeps the result until disconnect.
    pub async fn fetch_data_package(
        &self,
        games: Vec<String>,
    ) -> Result<DataPackagePayload, ClientError> {
        tracing::debug!(count = games.len(), "fetching data package");
        let reply = self
            .send_and_wait(
                vec![ClientMessage::GetDataPackage { games: Some(games) }],
                &[MessageKind::DataPackage],
                |_| true,
            )
            .await?;

        match reply {
            ServerMessage::DataPackage { data } => Ok(data),
            other => Err(ClientError::UnexpectedReply(other.kind())),
        }
    }

    // -- Accessors ---------------------------------------------------------

    /// A copy of the current session record.
    pub fn session(&self) -> Session {
        self.shared.link.session()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.shared.link.phase()
    }

    pub fn bus(&self) -> &Arc<DispatchBus> {
        &self.shared.bus
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.shared.correlator
    }

    pub fn session_cache(&self) -> &Arc<SessionCache> {
        &self.shared.cache
    }

    pub fn data_storage(&self) -> &Arc<DataStorage> {
        &self.shared.storage
    }

    pub fn options(&self) -> &ClientOptions {
        &self.shared.options
    }

    /// The id sent in `Connect`: [`ClientOptions::uuid`], or a random v4
    /// UUID fixed for the lifetime of this client.
    pub fn uuid(&self) -> &str {
        &self.shared.uuid
    }
}

impl<C: Connector> Drop for Client<C> {
    fn drop(&mut self) {
        self.shared.shutdown(None, DisconnectReason::Requested);
        // Subscriptions hold the storage engine, which holds the link,
        // which holds the bus.
        self.shared.bus.clear();
    }
}

impl<C: Connector> fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("session", &self.shared.link.session())
            .field("pending", &self.shared.correlator.pending_count())
            .field("options", &self.shared.options)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Connection tasks
// ---------------------------------------------------------------------------

/// Answers an out-of-order `ReceivedItems` with `Sync` plus the locally
/// known checked locations.
fn install_resync(cache: &Arc<SessionCache>, link: &Arc<Link>) {
    let weak_cache: Weak<SessionCache> = Arc::downgrade(cache);
    let weak_link: Weak<Link> = Arc::downgrade(link);
    cache.on_items_desync(move |desync| {
        let (Some(cache), Some(link)) = (weak_cache.upgrade(), weak_link.upgrade()) else {
            return;
        };
        tracing::info!(
            expected = desync.expected,
            received = desync.received,
            "requesting item resync"
        );
        let batch = vec![
            ClientMessage::Sync,
            ClientMessage::LocationChecks {
                locations: cache.checked_locations(),
            },
        ];
        if let Err(e) = link.send(batch) {
            tracing::debug!(error = %e, "resync not sent");
        }
    });
}

/// Hands the connection to a reader and a writer task. Returns `false`
/// if the attempt was closed while the channel was opening.
fn spawn_io<T: Connection>(shared: &Arc<Shared>, connection: T, generation: u64) -> bool {
    let connection = Arc::new(connection);
    let (writer, queue) = mpsc::unbounded_channel();
    let (shutdown, signal) = oneshot::channel();

    if !shared.link.open(generation, writer, shutdown) {
        tokio::spawn(async move {
            let _ = connection.close().await;
        });
        return false;
    }

    tokio::spawn(write_loop(Arc::clone(&connection), queue));
    tokio::spawn(read_loop(Arc::clone(shared), connection, generation, signal));
    true
}

/// Decodes frames and publishes them on the bus until the channel ends or
/// the link signals shutdown.
async fn read_loop<T: Connection>(
    shared: Arc<Shared>,
    connection: Arc<T>,
    generation: u64,
    mut signal: oneshot::Receiver<()>,
) {
    use archlink_protocol::Codec;

    let id = connection.id();
    tracing::debug!(%id, generation, "reader started");

    let reason = loop {
        tokio::select! {
            _ = &mut signal => {
                tracing::debug!(%id, "reader stopped");
                return;
            }
            frame = connection.recv() => match frame {
                Ok(Some(bytes)) => {
                    let messages = match shared.link.codec().decode_frame(&bytes) {
                        Ok(messages) => messages,
                        Err(e) => {
                            tracing::warn!(%id, error = %e, "dropping invalid frame");
                            continue;
                        }
                    };
                    let _dispatch = shared.dispatch.lock();
                    for message in &messages {
                        // A listener may have disconnected mid-frame.
                        if !shared.link.is_current(generation) {
                            return;
                        }
                        shared.bus.publish(message);
                    }
                }
                Ok(None) => break DisconnectReason::Closed,
                Err(e) => break DisconnectReason::TransportError(e.to_string()),
            },
        }
    };

    shared.shutdown(Some(generation), reason);
}

/// Drains the outbound queue in order, then closes the channel.
async fn write_loop<T: Connection>(
    connection: Arc<T>,
    mut queue: mpsc::UnboundedReceiver<String>,
) {
    while let Some(frame) = queue.recv().await {
        if let Err(e) = connection.send(&frame).await {
            tracing::warn!(id = %connection.id(), error = %e, "send failed; closing");
            break;
        }
    }
    if let Err(e) = connection.close().await {
        tracing::debug!(id = %connection.id(), error = %e, "close failed");
    }
}

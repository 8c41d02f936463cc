//! Connection lifecycle: engine construction, trust-anchor loading, bridge
//! and offload registration, optional SNI, hostname verification and the
//! handshake drive. Every failure path converges on one idempotent teardown.

use std::fmt;

use monoio::io::{AsyncReadRent, AsyncWriteRent};
use tracing::debug;

use crate::bridge::IoBridge;
use crate::engine::{DeviceId, EngineFactory, SessionSetup, TlsEngine};
use crate::error::TlsError;
use crate::offload::OffloadDispatcher;
use crate::provider::CryptoProvider;
use crate::stream::{drive, TlsStream};

/// Trust anchor used when the caller supplies none.
pub const DEFAULT_TRUST_ANCHORS: &[u8] = include_bytes!("../certs/default-ca.pem");

/// Ordered cipher preference, offload-aware: with AEAD offload available the
/// GCM suites come first (they are the accelerated ones); natively, ChaCha
/// leads.
pub fn default_cipher_preference(offload: bool) -> &'static [&'static str] {
    if offload {
        &[
            "TLS13-AES128-GCM-SHA256",
            "TLS13-AES256-GCM-SHA384",
            "TLS13-CHACHA20-POLY1305-SHA256",
        ]
    } else {
        &[
            "TLS13-CHACHA20-POLY1305-SHA256",
            "TLS13-AES128-GCM-SHA256",
            "TLS13-AES256-GCM-SHA384",
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Initializing,
    Handshaking,
    Established,
    Failed,
}

/// Owns every per-connection resource while the handshake is in flight, so
/// one teardown covers all exit paths. Resources are `Option`-ed: teardown
/// is safe to call repeatedly and when some were never allocated.
struct ConnectionContext<IO, E, P: CryptoProvider> {
    io: Option<IoBridge<IO>>,
    engine: Option<E>,
    offload: Option<OffloadDispatcher<P>>,
    state: Lifecycle,
}

impl<IO, E, P: CryptoProvider> ConnectionContext<IO, E, P> {
    fn new() -> Self {
        Self {
            io: None,
            engine: None,
            offload: None,
            state: Lifecycle::Initializing,
        }
    }

    fn teardown(&mut self) {
        if let Some(offload) = self.offload.as_mut() {
            offload.reset();
        }
        self.offload = None;
        self.engine = None;
        self.io = None;
        self.state = Lifecycle::Failed;
    }

    fn into_established(self) -> Result<TlsStream<IO, E, P>, TlsError> {
        match (self.state, self.io, self.engine, self.offload) {
            (Lifecycle::Established, Some(io), Some(engine), Some(offload)) => Ok(TlsStream {
                engine,
                io,
                offload,
                shut: false,
            }),
            _ => Err(TlsError::Setup {
                step: "finalize",
                source: None,
            }),
        }
    }
}

/// Builds TLS connections over an engine factory and a crypto provider,
/// providing an async `connect` method.
#[derive(Clone)]
pub struct TlsConnector<F, P> {
    factory: F,
    provider: P,
    trust_anchors: Option<Vec<u8>>,
    cipher_preference: Option<Vec<&'static str>>,
    use_sni: bool,
    offload_device: Option<DeviceId>,
    read_buffer: Option<usize>,
    write_buffer: Option<usize>,
}

impl<F, P> TlsConnector<F, P> {
    pub fn new(factory: F, provider: P) -> Self {
        Self {
            factory,
            provider,
            trust_anchors: None,
            cipher_preference: None,
            use_sni: true,
            offload_device: Some(DeviceId::default()),
            read_buffer: None,
            write_buffer: None,
        }
    }

    /// Replace the embedded default trust anchors with caller-provided PEM.
    pub fn trust_anchors(mut self, pem: Vec<u8>) -> Self {
        self.trust_anchors = Some(pem);
        self
    }

    pub fn cipher_preference(mut self, suites: Vec<&'static str>) -> Self {
        self.cipher_preference = Some(suites);
        self
    }

    /// Skip sending the server name in the hello. Hostname verification of
    /// the peer certificate still happens.
    pub fn disable_sni(mut self) -> Self {
        self.use_sni = false;
        self
    }

    /// `None` disables crypto offload entirely; the engine computes
    /// everything natively and the provider is only probed.
    pub fn offload_device(mut self, device: Option<DeviceId>) -> Self {
        self.offload_device = device;
        self
    }

    pub fn read_buffer(mut self, size: Option<usize>) -> Self {
        self.read_buffer = size;
        self
    }

    pub fn write_buffer(mut self, size: Option<usize>) -> Self {
        self.write_buffer = size;
        self
    }
}

impl<F, P> TlsConnector<F, P>
where
    F: EngineFactory,
    P: CryptoProvider + Clone,
{
    /// Connects the provided transport with this connector, assuming the
    /// provided domain for SNI and certificate verification.
    ///
    /// On any failure the whole connection context is torn down before the
    /// error is returned; a subsequent `connect` starts from a clean slate.
    pub async fn connect<IO>(
        &self,
        domain: &str,
        io: IO,
    ) -> Result<TlsStream<IO, F::Engine, P>, TlsError>
    where
        IO: AsyncReadRent + AsyncWriteRent,
    {
        let mut ctx = ConnectionContext::new();
        match self.handshake(domain, io, &mut ctx).await {
            Ok(()) => {
                ctx.state = Lifecycle::Established;
                ctx.into_established()
            }
            Err(e) => {
                ctx.teardown();
                Err(e)
            }
        }
    }

    async fn handshake<IO>(
        &self,
        domain: &str,
        io: IO,
        ctx: &mut ConnectionContext<IO, F::Engine, P>,
    ) -> Result<(), TlsError>
    where
        IO: AsyncReadRent + AsyncWriteRent,
    {
        debug!(domain, "initializing tls connection");
        ctx.io = Some(IoBridge::new(io, self.read_buffer, self.write_buffer));

        // capability probe happens here, once, before any dispatch
        ctx.offload = Some(OffloadDispatcher::new(self.provider.clone()));

        let trust_anchors = self
            .trust_anchors
            .as_deref()
            .unwrap_or(DEFAULT_TRUST_ANCHORS);

        let default_suites;
        let cipher_preference: &[&'static str] = match &self.cipher_preference {
            Some(suites) => suites,
            None => {
                default_suites = default_cipher_preference(self.offload_device.is_some());
                default_suites
            }
        };

        let setup = SessionSetup {
            trust_anchors,
            cipher_preference,
            server_name: self.use_sni.then_some(domain),
            verify_hostname: domain,
            offload_device: self.offload_device,
        };

        let wire = ctx
            .io
            .as_ref()
            .map(|bridge| bridge.wire())
            .ok_or(TlsError::Setup {
                step: "transport bridge",
                source: None,
            })?;
        let engine = self
            .factory
            .build(&setup, wire)
            .map_err(|e| TlsError::setup("engine construction", e))?;
        ctx.engine = Some(engine);

        ctx.state = Lifecycle::Handshaking;
        debug!(domain, "driving handshake");
        let (engine, io, offload) = match (ctx.engine.as_mut(), ctx.io.as_mut(), ctx.offload.as_mut())
        {
            (Some(e), Some(i), Some(o)) => (e, i, o),
            _ => {
                return Err(TlsError::Setup {
                    step: "context assembly",
                    source: None,
                })
            }
        };
        drive(engine, io, offload, |e| e.drive_connect())
            .await
            .map_err(|e| match e {
                // handshake failures are initialization failures to callers
                TlsError::Setup { .. } => e,
                other => TlsError::setup("handshake", other),
            })?;

        debug!(domain, "handshake complete");
        Ok(())
    }
}

impl<F, P> fmt::Debug for TlsConnector<F, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConnector")
            .field("use_sni", &self.use_sni)
            .field("offload_device", &self.offload_device)
            .finish()
    }
}

//! Shared test doubles: a virtual-clock environment and a scripted
//! transport that records every request it serves.

#![allow(dead_code)] // each test binary uses its own subset
#![allow(clippy::unwrap_used, clippy::panic)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use veil_client::{
    AuthSession, Environment, HttpResponse, HttpTransport, KeyBundle, Keyring, MemoryKeyring,
    PeerKeys, TransportError,
};

/// Small modulus so key generation does not dominate the test run.
pub const TEST_RSA_BITS: usize = 1024;

struct TestEnvInner {
    anchor: Instant,
    offset: Mutex<Duration>,
    millis: AtomicU64,
    rng_state: AtomicU64,
}

/// Deterministic environment: a clock that only moves when told to, a
/// wall clock that ticks once per read, and a seeded RNG.
#[derive(Clone)]
pub struct TestEnv {
    inner: Arc<TestEnvInner>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TestEnvInner {
                anchor: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
                millis: AtomicU64::new(1_700_000_000_000),
                rng_state: AtomicU64::new(0x9E37_79B9_7F4A_7C15),
            }),
        }
    }

    /// Advance the monotonic clock.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.inner.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Environment for TestEnv {
    fn now(&self) -> Instant {
        let offset = *self.inner.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.anchor + offset
    }

    fn unix_millis(&self) -> u64 {
        self.inner.millis.fetch_add(1, Ordering::SeqCst)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        // xorshift64, seeded; quality is irrelevant, distinctness is not
        for byte in buffer {
            let mut x = self.inner.rng_state.load(Ordering::SeqCst);
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.inner.rng_state.store(x, Ordering::SeqCst);
            *byte = (x & 0xFF) as u8;
        }
    }
}

enum Outcome {
    Reply(HttpResponse),
    Fail(String),
}

struct Step {
    /// Virtual time that passes while this request is in flight.
    advance: Duration,
    outcome: Outcome,
}

/// Transport that serves a pre-written script and records every call.
pub struct ScriptedTransport {
    env: Option<TestEnv>,
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self { env: None, script: Mutex::new(VecDeque::new()), calls: Mutex::new(Vec::new()) }
    }

    /// A transport whose in-flight delays move the given virtual clock.
    pub fn with_env(env: TestEnv) -> Self {
        Self { env: Some(env), ..Self::new() }
    }

    fn push(&self, step: Step) {
        self.script.lock().unwrap_or_else(PoisonError::into_inner).push_back(step);
    }

    pub fn push_json(&self, status: u16, body: serde_json::Value) {
        self.push(Step {
            advance: Duration::ZERO,
            outcome: Outcome::Reply(HttpResponse { status, body: body.to_string() }),
        });
    }

    pub fn push_text(&self, status: u16, body: &str) {
        self.push(Step {
            advance: Duration::ZERO,
            outcome: Outcome::Reply(HttpResponse { status, body: body.to_string() }),
        });
    }

    pub fn push_failure(&self, reason: &str) {
        self.push_failure_after(Duration::ZERO, reason);
    }

    /// A network failure observed after the request sat for `advance`.
    pub fn push_failure_after(&self, advance: Duration, reason: &str) {
        self.push(Step { advance, outcome: Outcome::Fail(reason.to_string()) });
    }

    /// Every `(endpoint, params)` pair served so far, in order.
    pub fn calls(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.calls().into_iter().map(|(endpoint, _)| endpoint).collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn post_form(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((endpoint.to_string(), params.to_vec()));

        let step = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| panic!("unscripted request to {endpoint}"));

        if let Some(env) = &self.env {
            env.advance(step.advance);
        }
        match step.outcome {
            Outcome::Reply(response) => Ok(response),
            Outcome::Fail(reason) => Err(TransportError::Request { reason }),
        }
    }
}

/// Look up a form parameter by name.
pub fn param<'a>(params: &'a [(String, String)], name: &str) -> &'a str {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
        .unwrap_or_else(|| panic!("missing parameter {name}"))
}

/// A session with a generated identity and a stored token, ready to make
/// authenticated requests against `transport`.
pub async fn authenticated_session(
    env: TestEnv,
    transport: Arc<ScriptedTransport>,
) -> Arc<AuthSession<TestEnv>> {
    let keyring = MemoryKeyring::new();
    keyring.store_token("test-token").unwrap();

    let session = Arc::new(
        AuthSession::new(env, transport, Arc::new(keyring)).with_rsa_bits(TEST_RSA_BITS),
    );
    let bundle = KeyBundle::generate(&mut rand::rngs::OsRng, TEST_RSA_BITS).unwrap();
    session.keystore().install(bundle).await.unwrap();
    session
}

/// The session's own public keys, for seeding the peer cache.
pub async fn own_peer_keys(session: &AuthSession<TestEnv>) -> PeerKeys {
    let signing = session.keystore().signing_keys().await.unwrap();
    let (_, message_pem) = session.keystore().identity_public_pems().await.unwrap();
    PeerKeys {
        signing: signing.public().clone(),
        encryption: veil_crypto::EncryptionPublicKey::from_pem(&message_pem).unwrap(),
    }
}

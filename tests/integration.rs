//! Integration tests for the govgate API.
//!
//! Each test spins up a real server on an ephemeral port with in-memory
//! stores and a scripted ledger, then drives it over HTTP.

use alloy_primitives::{address, Address, U256};
use async_trait::async_trait;
use govgate::{
    auth::{
        middleware::{AppState, Backends},
        verify::{address_of, generate_signing_key, sign_message},
    },
    capability::{LedgerError, LedgerQuery},
    config::Config,
    routes,
};
use k256::ecdsa::SigningKey;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const TOKEN: Address = address!("0101010101010101010101010101010101010101");
const REGISTRY: Address = address!("0202020202020202020202020202020202020202");
const DELEGATION: Address = address!("0303030303030303030303030303030303030303");

/// On-chain facts for one account.
#[derive(Clone, Copy, Default)]
struct Holdings {
    tokens: u64,
    votes: u64,
    registered: bool,
}

/// Ledger answering from a fixed table. Unknown accounts hold nothing and
/// unknown agent ids revert.
#[derive(Default)]
struct ScriptedLedger {
    accounts: Mutex<HashMap<Address, Holdings>>,
    agents: Mutex<HashMap<u64, Address>>,
    balance_calls: AtomicUsize,
}

impl ScriptedLedger {
    fn set(&self, account: Address, holdings: Holdings) {
        self.accounts.lock().unwrap().insert(account, holdings);
    }

    fn register_agent(&self, agent_id: u64, owner: Address) {
        self.agents.lock().unwrap().insert(agent_id, owner);
    }

    fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    fn get(&self, account: Address) -> Holdings {
        self.accounts
            .lock()
            .unwrap()
            .get(&account)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl LedgerQuery for ScriptedLedger {
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, LedgerError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        let holdings = self.get(owner);
        if token == REGISTRY {
            return Ok(U256::from(holdings.registered as u8));
        }
        Ok(U256::from(holdings.tokens))
    }

    async fn voting_power(
        &self,
        _delegation: Address,
        account: Address,
    ) -> Result<U256, LedgerError> {
        Ok(U256::from(self.get(account).votes))
    }

    async fn agent_owner(&self, _registry: Address, agent_id: u64) -> Result<Address, LedgerError> {
        self.agents
            .lock()
            .unwrap()
            .get(&agent_id)
            .copied()
            .ok_or_else(|| LedgerError::Rpc {
                code: 3,
                message: "execution reverted: ERC721NonexistentToken".to_string(),
            })
    }
}

fn test_config(rate_limit_per_window: u64) -> Config {
    Config {
        session_secret: "integration-secret-integration-secret"
            .to_string()
            .into(),
        session_ttl_secs: 86_400,
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        trusted_proxy_count: 0,
        cors_allow_any_origin: true,
        api_domain: "api.anons.lol".to_string(),
        api_uri: "https://api.anons.lol/auth".to_string(),
        chain_id: 8453,
        nonce_ttl_secs: 300,
        rpc_url: None,
        token_contract: TOKEN,
        delegation_contract: DELEGATION,
        agent_registry: REGISTRY,
        capability_cache_ttl_secs: 30,
        ledger_query_timeout_ms: 3_000,
        ledger_deadline_ms: 5_000,
        redis_url: None,
        rate_limit_per_window,
        rate_limit_window_secs: 60,
        rate_limit_auth_per_window: 10,
        cleanup_interval_secs: 300,
        holder_recheck: true,
        require_registered_agent: false,
    }
}

/// Spin up a test server and return its base URL.
async fn spawn_server(config: Config, ledger: Option<Arc<dyn LedgerQuery>>) -> String {
    let state = AppState::new(config, Backends::in_memory(ledger)).expect("Failed to build state");
    let app = routes::build_app(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await
        .unwrap();
    });

    format!("http://{}", addr)
}

/// Server backed by a scripted ledger the test can populate.
async fn spawn_with_ledger() -> (String, Arc<ScriptedLedger>) {
    let ledger = Arc::new(ScriptedLedger::default());
    let base_url = spawn_server(
        test_config(1_000),
        Some(ledger.clone() as Arc<dyn LedgerQuery>),
    )
    .await;
    (base_url, ledger)
}

/// Request a challenge and return the message to sign.
async fn request_challenge(client: &reqwest::Client, base_url: &str, address: Address) -> Value {
    let resp = client
        .post(format!("{}/auth/nonce", base_url))
        .json(&json!({ "address": address, "agentId": 7 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

/// Full challenge/response login. Returns the raw verify response.
async fn login(client: &reqwest::Client, base_url: &str, key: &SigningKey) -> reqwest::Response {
    let challenge = request_challenge(client, base_url, address_of(key)).await;
    let message = challenge["message"].as_str().unwrap();
    let signature = sign_message(key, message).unwrap();

    client
        .post(format!("{}/auth/verify", base_url))
        .json(&json!({ "message": message, "signature": signature }))
        .send()
        .await
        .unwrap()
}

/// Login and return the session token.
async fn login_token(client: &reqwest::Client, base_url: &str, key: &SigningKey) -> String {
    let resp = login(client, base_url, key).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

async fn get_with_token(
    client: &reqwest::Client,
    url: String,
    token: &str,
) -> reqwest::Response {
    client
        .get(url)
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
}

async fn post_with_token(
    client: &reqwest::Client,
    url: String,
    token: &str,
) -> reqwest::Response {
    client
        .post(url)
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
}

// ============================================================================
// Challenge / Response Tests
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let base_url = spawn_server(test_config(1_000), None).await;
    let resp = reqwest::get(format!("{}/health", base_url)).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("x-content-type-options").unwrap(), "nosniff");

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_challenge_contents() {
    let (base_url, _ledger) = spawn_with_ledger().await;
    let client = reqwest::Client::new();
    let key = generate_signing_key();

    let challenge = request_challenge(&client, &base_url, address_of(&key)).await;
    let message = challenge["message"].as_str().unwrap();
    let nonce = challenge["nonce"].as_str().unwrap();

    assert_eq!(nonce.len(), 32);
    assert!(message.starts_with("api.anons.lol wants you to sign in with your Ethereum account:"));
    assert!(message.contains(&address_of(&key).to_checksum(None)));
    assert!(message.contains(&format!("Nonce: {}", nonce)));
    assert!(message.contains("Chain ID: 8453"));
    assert!(message.contains("Agent ID: 7"));
    assert_eq!(challenge["domain"], "api.anons.lol");
    assert_eq!(challenge["expiresIn"], 300);
}

#[tokio::test]
async fn test_missing_address_rejected() {
    let (base_url, _ledger) = spawn_with_ledger().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/auth/nonce", base_url))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["reason"], "invalid_request");
}

#[tokio::test]
async fn test_holder_flow() {
    let (base_url, ledger) = spawn_with_ledger().await;
    let client = reqwest::Client::new();
    let key = generate_signing_key();
    ledger.set(
        address_of(&key),
        Holdings {
            tokens: 2,
            votes: 2,
            registered: true,
        },
    );
    ledger.register_agent(7, address_of(&key));

    let resp = login(&client, &base_url, &key).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["isHolder"], true);
    assert_eq!(body["isDelegated"], false);
    assert_eq!(body["isRegisteredAgent"], true);
    assert_eq!(body["votingPower"], "2");
    assert_eq!(body["expiresIn"], 86_400);
    let token = body["token"].as_str().unwrap();

    let resp = get_with_token(&client, format!("{}/member/profile", base_url), token).await;
    assert_eq!(resp.status(), 200);
    let profile: Value = resp.json().await.unwrap();
    assert_eq!(profile["directBalance"], "2");
    assert_eq!(profile["agentId"], 7);

    let resp = get_with_token(&client, format!("{}/member/forum", base_url), token).await;
    assert_eq!(resp.status(), 200);

    let resp = post_with_token(&client, format!("{}/member/proposals", base_url), token).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["author"].as_str().unwrap().to_lowercase(),
        address_of(&key).to_string().to_lowercase()
    );
}

#[tokio::test]
async fn test_non_holder_denied() {
    let (base_url, _ledger) = spawn_with_ledger().await;
    let client = reqwest::Client::new();
    let key = generate_signing_key();

    let token = login_token(&client, &base_url, &key).await;

    // Authenticated, but holds nothing
    let resp = get_with_token(&client, format!("{}/auth/session", base_url), &token).await;
    assert_eq!(resp.status(), 200);

    let resp = get_with_token(&client, format!("{}/member/profile", base_url), &token).await;
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["reason"], "capability_denied");

    let resp = post_with_token(&client, format!("{}/member/proposals", base_url), &token).await;
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_delegatee_is_member_not_holder() {
    let (base_url, ledger) = spawn_with_ledger().await;
    let client = reqwest::Client::new();
    let key = generate_signing_key();
    ledger.set(
        address_of(&key),
        Holdings {
            tokens: 0,
            votes: 5,
            registered: false,
        },
    );

    let token = login_token(&client, &base_url, &key).await;

    let resp = get_with_token(&client, format!("{}/member/profile", base_url), &token).await;
    assert_eq!(resp.status(), 200);
    let profile: Value = resp.json().await.unwrap();
    assert_eq!(profile["isDelegated"], true);
    assert_eq!(profile["votingPower"], "5");

    let resp = post_with_token(&client, format!("{}/member/proposals", base_url), &token).await;
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_replay_rejected() {
    let (base_url, _ledger) = spawn_with_ledger().await;
    let client = reqwest::Client::new();
    let key = generate_signing_key();

    let challenge = request_challenge(&client, &base_url, address_of(&key)).await;
    let message = challenge["message"].as_str().unwrap();
    let signature = sign_message(&key, message).unwrap();
    let body = json!({ "message": message, "signature": signature });

    let resp = client
        .post(format!("{}/auth/verify", base_url))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{}/auth/verify", base_url))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["reason"], "nonce_rejected");
}

#[tokio::test]
async fn test_foreign_signature_rejected() {
    let (base_url, _ledger) = spawn_with_ledger().await;
    let client = reqwest::Client::new();
    let key = generate_signing_key();
    let attacker = generate_signing_key();

    let challenge = request_challenge(&client, &base_url, address_of(&key)).await;
    let message = challenge["message"].as_str().unwrap();
    let forged = sign_message(&attacker, message).unwrap();

    let resp = client
        .post(format!("{}/auth/verify", base_url))
        .json(&json!({ "message": message, "signature": forged }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["reason"], "signature_invalid");

    // The nonce was not burned by the forgery
    let signature = sign_message(&key, message).unwrap();
    let resp = client
        .post(format!("{}/auth/verify", base_url))
        .json(&json!({ "message": message, "signature": signature }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_tampered_message_rejected() {
    let (base_url, _ledger) = spawn_with_ledger().await;
    let client = reqwest::Client::new();
    let key = generate_signing_key();

    let challenge = request_challenge(&client, &base_url, address_of(&key)).await;
    let message = challenge["message"].as_str().unwrap();
    let signature = sign_message(&key, message).unwrap();
    let tampered = message.replace("Agent ID: 7", "Agent ID: 8");

    let resp = client
        .post(format!("{}/auth/verify", base_url))
        .json(&json!({ "message": tampered, "signature": signature }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_verify_requires_message_and_signature() {
    let (base_url, _ledger) = spawn_with_ledger().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/auth/verify", base_url))
        .json(&json!({ "message": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/auth/verify", base_url))
        .json(&json!({ "message": "not a challenge", "signature": "0x00" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

// ============================================================================
// Session Tests
// ============================================================================

#[tokio::test]
async fn test_session_round_trip() {
    let (base_url, ledger) = spawn_with_ledger().await;
    let client = reqwest::Client::new();
    let key = generate_signing_key();
    ledger.set(
        address_of(&key),
        Holdings {
            tokens: 1,
            votes: 1,
            registered: false,
        },
    );
    ledger.register_agent(7, address_of(&key));

    let token = login_token(&client, &base_url, &key).await;

    let resp = get_with_token(&client, format!("{}/auth/session", base_url), &token).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["valid"], true);
    assert_eq!(body["tier"], "agent");
    assert_eq!(body["issuer"], "anons-dao");
    assert_eq!(body["agentId"], 7);
    assert_eq!(body["capabilities"]["isHolder"], true);
    assert_eq!(
        body["expiresAt"].as_i64().unwrap() - body["issuedAt"].as_i64().unwrap(),
        86_400
    );
}

#[tokio::test]
async fn test_missing_or_invalid_bearer_unauthorized() {
    let (base_url, _ledger) = spawn_with_ledger().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/auth/session", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = get_with_token(&client, format!("{}/member/profile", base_url), "garbage").await;
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(format!("{}/member/profile", base_url))
        .header("Authorization", "Basic abc")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["reason"], "unauthorized");
}

#[tokio::test]
async fn test_token_from_other_deployment_rejected() {
    let (base_url, _ledger) = spawn_with_ledger().await;
    let client = reqwest::Client::new();
    let key = generate_signing_key();

    let mut other = test_config(1_000);
    other.session_secret = "another-deployment-secret-another-deployment".to_string().into();
    let other_url = spawn_server(other, None).await;
    let token = login_token(&client, &other_url, &key).await;

    let resp = get_with_token(&client, format!("{}/auth/session", base_url), &token).await;
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_legacy_tier_is_never_member() {
    let (base_url, ledger) = spawn_with_ledger().await;
    let client = reqwest::Client::new();
    let key = generate_signing_key();
    let address = address_of(&key);
    ledger.set(
        address,
        Holdings {
            tokens: 3,
            votes: 3,
            registered: true,
        },
    );

    let challenge = request_challenge(&client, &base_url, address).await;
    let message = format!(
        "Sign in to Anons DAO\nAddress: {}\nNonce: {}\n",
        address.to_checksum(None),
        challenge["nonce"].as_str().unwrap()
    );
    let signature = sign_message(&key, &message).unwrap();

    let resp = client
        .post(format!("{}/auth/legacy", base_url))
        .json(&json!({ "message": message, "signature": signature }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["tier"], "legacy");
    let token = body["token"].as_str().unwrap();

    let resp = get_with_token(&client, format!("{}/auth/session", base_url), token).await;
    assert_eq!(resp.status(), 200);

    // Holds tokens on-chain, but a legacy session carries no capabilities
    let resp = get_with_token(&client, format!("{}/member/profile", base_url), token).await;
    assert_eq!(resp.status(), 403);

    // Legacy logins are single-use too
    let resp = client
        .post(format!("{}/auth/legacy", base_url))
        .json(&json!({ "message": message, "signature": signature }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

// ============================================================================
// Capability Source Tests
// ============================================================================

#[tokio::test]
async fn test_without_ledger_every_capability_is_false() {
    let base_url = spawn_server(test_config(1_000), None).await;
    let client = reqwest::Client::new();
    let key = generate_signing_key();

    let resp = login(&client, &base_url, &key).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["isHolder"], false);
    assert_eq!(body["isDelegated"], false);
    assert_eq!(body["isRegisteredAgent"], false);
    assert_eq!(body["votingPower"], "0");
    // Agent ownership cannot be confirmed either, so the claimed id is dropped
    assert!(body["agentId"].is_null());
    let token = body["token"].as_str().unwrap();

    let resp = get_with_token(&client, format!("{}/member/forum", base_url), token).await;
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_registered_agent_requirement() {
    let ledger = Arc::new(ScriptedLedger::default());
    let mut config = test_config(1_000);
    config.require_registered_agent = true;
    let base_url = spawn_server(config, Some(ledger.clone() as Arc<dyn LedgerQuery>)).await;
    let client = reqwest::Client::new();

    let unregistered = generate_signing_key();
    let resp = login(&client, &base_url, &unregistered).await;
    assert_eq!(resp.status(), 403);

    let registered = generate_signing_key();
    ledger.set(
        address_of(&registered),
        Holdings {
            tokens: 0,
            votes: 0,
            registered: true,
        },
    );
    let resp = login(&client, &base_url, &registered).await;
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_agent_id_owned_by_someone_else_rejected() {
    let (base_url, ledger) = spawn_with_ledger().await;
    let client = reqwest::Client::new();
    let key = generate_signing_key();
    ledger.register_agent(7, address!("0909090909090909090909090909090909090909"));

    let resp = login(&client, &base_url, &key).await;
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["reason"], "unauthorized");
}

#[tokio::test]
async fn test_unregistered_agent_id_is_dropped() {
    let (base_url, _ledger) = spawn_with_ledger().await;
    let client = reqwest::Client::new();
    let key = generate_signing_key();

    let token = login_token(&client, &base_url, &key).await;
    let resp = get_with_token(&client, format!("{}/auth/session", base_url), &token).await;
    let body: Value = resp.json().await.unwrap();
    assert!(body["agentId"].is_null());
}

#[tokio::test]
async fn test_holder_recheck_never_queries_ledger() {
    let ledger = Arc::new(ScriptedLedger::default());
    let mut config = test_config(1_000);
    // Every cache lookup misses
    config.capability_cache_ttl_secs = 0;
    let base_url = spawn_server(config, Some(ledger.clone() as Arc<dyn LedgerQuery>)).await;
    let client = reqwest::Client::new();
    let key = generate_signing_key();
    ledger.set(
        address_of(&key),
        Holdings {
            tokens: 1,
            votes: 1,
            registered: false,
        },
    );

    let token = login_token(&client, &base_url, &key).await;
    let calls_after_login = ledger.balance_calls();
    assert!(calls_after_login > 0);

    // On a miss the session snapshot stands, without a ledger round trip
    for _ in 0..3 {
        let resp = post_with_token(&client, format!("{}/member/proposals", base_url), &token).await;
        assert_eq!(resp.status(), 200);
    }
    assert_eq!(ledger.balance_calls(), calls_after_login);
}

// ============================================================================
// Rate Limit Tests
// ============================================================================

#[tokio::test]
async fn test_rate_limit_enforced() {
    let base_url = spawn_server(test_config(3), None).await;
    let client = reqwest::Client::new();

    for remaining in ["2", "1", "0"] {
        let resp = client
            .get(format!("{}/health", base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers().get("x-ratelimit-limit").unwrap(), "3");
        assert_eq!(resp.headers().get("x-ratelimit-remaining").unwrap(), remaining);
    }

    let resp = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    let retry_after: u64 = resp
        .headers()
        .get("retry-after")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(resp.headers().get("x-ratelimit-remaining").unwrap(), "0");
    let reset_header: i64 = resp
        .headers()
        .get("x-ratelimit-reset")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();

    // Body and header carry the same unix-seconds reset time
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["reason"], "rate_limited");
    assert_eq!(body["resetAt"].as_i64(), Some(reset_header));
}

#[tokio::test]
async fn test_session_has_own_quota() {
    let base_url = spawn_server(test_config(4), None).await;
    let client = reqwest::Client::new();
    let key = generate_signing_key();

    // Two unauthenticated requests from this IP
    let token = login_token(&client, &base_url, &key).await;

    // Requests carrying the session count against the address, not the IP
    for _ in 0..4 {
        let resp = get_with_token(&client, format!("{}/auth/session", base_url), &token).await;
        assert_eq!(resp.status(), 200);
    }
    let resp = get_with_token(&client, format!("{}/auth/session", base_url), &token).await;
    assert_eq!(resp.status(), 429);

    // The IP still has quota left
    let resp = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_nonce_flood_for_address_does_not_lock_out_owner() {
    let mut config = test_config(1_000);
    config.rate_limit_auth_per_window = 2;
    // X-Forwarded-For names the client; without it the socket peer is used
    config.trusted_proxy_count = 1;
    let base_url = spawn_server(config, None).await;
    let client = reqwest::Client::new();
    let victim = generate_signing_key();

    // A third party spams challenges for the victim's address
    let mut statuses = Vec::new();
    for _ in 0..5 {
        let resp = client
            .post(format!("{}/auth/nonce", base_url))
            .header("X-Forwarded-For", "192.0.2.66")
            .json(&json!({ "address": address_of(&victim) }))
            .send()
            .await
            .unwrap();
        statuses.push(resp.status().as_u16());
    }
    assert_eq!(statuses, vec![200, 200, 429, 429, 429]);

    // The victim, connecting directly, still gets in
    let resp = login(&client, &base_url, &victim).await;
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_auth_quota_per_client() {
    let mut config = test_config(1_000);
    config.rate_limit_auth_per_window = 2;
    let base_url = spawn_server(config, None).await;
    let client = reqwest::Client::new();

    // Distinct addresses from one client share its quota
    for _ in 0..2 {
        request_challenge(&client, &base_url, address_of(&generate_signing_key())).await;
    }

    let resp = client
        .post(format!("{}/auth/nonce", base_url))
        .json(&json!({ "address": address_of(&generate_signing_key()) }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["reason"], "rate_limited");
}

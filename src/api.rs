//! Minimal HTTP API over the reward engine.
//! Hand-rolled request parsing keeps the server to one tokio listener.
//!
//! Caller identity comes from the `X-User-Id` header and the risk factor
//! from `X-Risk-Penalty` (default 1.0). Both are set by the gateway in front
//! of this service.

use std::sync::{Arc, Mutex, PoisonError};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::engine::{EngineError, RewardEngine};
use crate::habits::HabitError;
use crate::leaderboard::{LeaderboardMetric, LeaderboardWindow};
use crate::rewards::RiskPenalty;
use crate::store::RewardStore;
use crate::types::{now_millis, HabitId, Timestamp, UserId};

/// Default leaderboard length
const DEFAULT_LIMIT: usize = 100;

/// Shared server state
pub struct ApiState<S> {
    engine: Arc<RewardEngine<S>>,
    rng: Mutex<ChaCha8Rng>,
    started_at: Timestamp,
}

impl<S: RewardStore> ApiState<S> {
    /// Wrap an engine; `seed` fixes the reward rolls
    pub fn new(engine: Arc<RewardEngine<S>>, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
        Self {
            engine,
            rng: Mutex::new(rng),
            started_at: now_millis(),
        }
    }

    /// The engine behind the API
    pub fn engine(&self) -> &Arc<RewardEngine<S>> {
        &self.engine
    }

    /// Generator for one request, seeded from the shared stream. The shared
    /// lock is released before the engine runs.
    fn request_rng(&self) -> ChaCha8Rng {
        let seed = self.rng.lock().unwrap_or_else(PoisonError::into_inner).gen::<u64>();
        ChaCha8Rng::seed_from_u64(seed)
    }
}

/// Bind `port` and serve until the task is dropped
pub async fn start_api_server<S>(state: Arc<ApiState<S>>, port: u16)
where
    S: RewardStore + 'static,
{
    let addr = format!("0.0.0.0:{port}");
    info!("Starting API at http://{}", addr);

    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind API port {}: {}", port, e);
            return;
        }
    };
    serve(listener, state).await;
}

/// Accept loop on an already bound listener
pub async fn serve<S>(listener: TcpListener, state: Arc<ApiState<S>>)
where
    S: RewardStore + 'static,
{
    loop {
        let (mut socket, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("API accept error: {}", e);
                continue;
            }
        };

        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let mut buf = [0; 4096];
            let n = match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };

            let request = String::from_utf8_lossy(&buf[..n]);
            let response = handle_request(&request, &state, now_millis());

            if let Err(e) = socket.write_all(response.as_bytes()).await {
                warn!("Failed to write API response: {}", e);
            }
        });
    }
}

struct Request<'a> {
    method: &'a str,
    path: &'a str,
    query: &'a str,
    headers: Vec<(&'a str, &'a str)>,
}

impl<'a> Request<'a> {
    fn parse(raw: &'a str) -> Self {
        let mut lines = raw.lines();
        let mut parts = lines.next().unwrap_or("").split_whitespace();
        let method = parts.next().unwrap_or("GET");
        let target = parts.next().unwrap_or("/");
        let (path, query) = target.split_once('?').unwrap_or((target, ""));

        let headers = lines
            .take_while(|line| !line.is_empty())
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim(), v.trim()))
            .collect();

        Self {
            method,
            path,
            query,
            headers,
        }
    }

    fn header(&self, name: &str) -> Option<&'a str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
    }

    fn query_param(&self, name: &str) -> Option<&'a str> {
        self.query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }
}

type Reply = Result<Value, (u16, Value)>;

fn bad_request(message: impl Into<String>) -> (u16, Value) {
    (400, json!({ "error": "bad_request", "message": message.into() }))
}

fn engine_error(err: &EngineError) -> (u16, Value) {
    let (status, code) = match err {
        EngineError::Habit(habit) => (
            409,
            match habit {
                HabitError::AlreadyCompletedToday => "already_completed_today",
                HabitError::NoFreezeAvailable => "no_freeze_available",
                HabitError::NotNeeded => "not_needed",
                HabitError::InsufficientPoints { .. } => "insufficient_points",
                HabitError::FreezeAlreadyOwned => "freeze_already_owned",
            },
        ),
        EngineError::NotFound(_) => (404, "not_found"),
        EngineError::Unauthorized { .. } => (403, "unauthorized"),
        EngineError::Contended(_) => (409, "conflict"),
        EngineError::Store(_) => (503, "store_unavailable"),
    };
    (status, json!({ "error": code, "message": err.to_string() }))
}

fn parse_user(raw: &str) -> Result<UserId, (u16, Value)> {
    raw.parse().map_err(|_| bad_request(format!("invalid user id: {raw}")))
}

fn parse_habit(raw: &str) -> Result<HabitId, (u16, Value)> {
    raw.parse().map_err(|_| bad_request(format!("invalid habit id: {raw}")))
}

fn risk_penalty(req: &Request<'_>) -> Result<RiskPenalty, (u16, Value)> {
    let Some(raw) = req.header("X-Risk-Penalty") else {
        return Ok(RiskPenalty::NONE);
    };
    raw.parse::<f64>()
        .ok()
        .and_then(|f| RiskPenalty::new(f).ok())
        .ok_or_else(|| bad_request(format!("invalid X-Risk-Penalty: {raw}")))
}

/// Caller from `X-User-Id`; must match `path_user` when the route names one
fn caller(req: &Request<'_>, path_user: Option<UserId>) -> Result<UserId, (u16, Value)> {
    let header = req.header("X-User-Id").map(parse_user).transpose()?;
    match (header, path_user) {
        (Some(h), Some(p)) if h != p => Err((
            403,
            json!({ "error": "unauthorized", "message": "X-User-Id does not match path" }),
        )),
        (_, Some(p)) => Ok(p),
        (Some(h), None) => Ok(h),
        (None, None) => Err(bad_request("missing X-User-Id")),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Reply {
    serde_json::to_value(value).map_err(|e| (500, json!({ "error": "internal", "message": e.to_string() })))
}

/// Route one raw request to the engine and render the HTTP response
pub fn handle_request<S: RewardStore>(raw: &str, state: &ApiState<S>, now: Timestamp) -> String {
    let req = Request::parse(raw);
    let segments: Vec<&str> = req.path.split('/').filter(|s| !s.is_empty()).collect();

    let reply = route(&req, &segments, state, now);
    match reply {
        Ok(body) => json_response(200, &body),
        Err((status, body)) => json_response(status, &body),
    }
}

fn route<S: RewardStore>(req: &Request<'_>, segments: &[&str], state: &ApiState<S>, now: Timestamp) -> Reply {
    let engine = &state.engine;

    match (req.method, segments) {
        ("GET", ["api", "status"]) => {
            let odds: serde_json::Map<String, Value> = engine
                .odds()
                .entries()
                .into_iter()
                .map(|(name, odds)| (name, json!({ "chance": odds.chance, "multiplier": odds.multiplier.as_f64() })))
                .collect();
            Ok(json!({
                "version": crate::VERSION,
                "uptime_ms": now - state.started_at,
                "tracked_combos": engine.combos().tracked_users(),
                "odds": odds,
            }))
        }

        ("GET", ["api", "users", id]) => {
            let user = parse_user(id)?;
            let profile = engine.profile(user).map_err(|e| engine_error(&e))?;
            to_json(&profile)
        }

        ("GET", ["api", "leaderboard", metric, window]) => {
            let metric: LeaderboardMetric = metric.parse().map_err(bad_request)?;
            let window: LeaderboardWindow = window.parse().map_err(bad_request)?;
            let limit = match req.query_param("limit") {
                Some(raw) => raw
                    .parse::<usize>()
                    .map_err(|_| bad_request(format!("invalid limit: {raw}")))?,
                None => DEFAULT_LIMIT,
            };
            let board = engine
                .leaderboard(metric, window, now, Some(limit))
                .map_err(|e| engine_error(&e))?;
            to_json(&board)
        }

        ("POST", ["api", "users", id, "click"]) => {
            let user = caller(req, Some(parse_user(id)?))?;
            let risk = risk_penalty(req)?;
            let mut rng = state.request_rng();
            let outcome = engine
                .record_click(user, now, risk, &mut rng)
                .map_err(|e| engine_error(&e))?;
            to_json(&outcome)
        }

        ("POST", ["api", "users", id, "login"]) => {
            let user = caller(req, Some(parse_user(id)?))?;
            let outcome = engine.record_login(user, now).map_err(|e| engine_error(&e))?;
            to_json(&outcome)
        }

        ("POST", ["api", "users", id, "ad"]) => {
            let user = caller(req, Some(parse_user(id)?))?;
            let risk = risk_penalty(req)?;
            let outcome = engine.record_ad_view(user, risk).map_err(|e| engine_error(&e))?;
            to_json(&outcome)
        }

        ("POST", ["api", "users", id, "habits", habit, "complete"]) => {
            let user = caller(req, Some(parse_user(id)?))?;
            let habit = parse_habit(habit)?;
            let mut rng = state.request_rng();
            let outcome = engine
                .complete_habit(user, habit, now, &mut rng)
                .map_err(|e| engine_error(&e))?;
            to_json(&outcome)
        }

        ("POST", ["api", "habits", habit, "freeze", "use"]) => {
            let user = caller(req, None)?;
            let habit = engine
                .use_freeze(user, parse_habit(habit)?, now)
                .map_err(|e| engine_error(&e))?;
            to_json(&json!({ "ok": true, "habit": habit }))
        }

        ("POST", ["api", "habits", habit, "freeze", "buy"]) => {
            let user = caller(req, None)?;
            let outcome = engine
                .buy_freeze(user, parse_habit(habit)?)
                .map_err(|e| engine_error(&e))?;
            to_json(&outcome)
        }

        _ => Err((404, json!({ "error": "not_found", "message": req.path }))),
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}

fn json_response(status: u16, body: &Value) -> String {
    let s = body.to_string();
    format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nContent-Type: application/json\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n{}",
        status,
        status_text(status),
        s.len(),
        s
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::events::TracingDispatcher;
    use crate::store::MemoryStore;
    use crate::types::{Difficulty, Habit, User, DAY_MS};

    const NOW: Timestamp = 20 * DAY_MS;

    fn state() -> ApiState<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert_user(&User::new(UserId::new(1), "ana")).unwrap();
        store.insert_user(&User::new(UserId::new(2), "bob")).unwrap();
        store
            .insert_habit(&Habit::new(HabitId::new(10), UserId::new(1), "run", Difficulty::Easy))
            .unwrap();
        let engine = RewardEngine::new(store, &EngineConfig::default(), Arc::new(TracingDispatcher));
        ApiState::new(Arc::new(engine), Some(7))
    }

    fn call(state: &ApiState<MemoryStore>, raw: &str) -> (u16, Value) {
        let response = handle_request(raw, state, NOW);
        let status = response[9..12].parse().unwrap();
        let body = response.split("\r\n\r\n").nth(1).unwrap();
        (status, serde_json::from_str(body).unwrap())
    }

    #[test]
    fn test_request_parsing() {
        let req = Request::parse("GET /api/leaderboard/points/weekly?limit=5&x=1 HTTP/1.1\r\nHost: a\r\nx-user-id: 3\r\n\r\n");
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/api/leaderboard/points/weekly");
        assert_eq!(req.query_param("limit"), Some("5"));
        assert_eq!(req.header("X-User-Id"), Some("3"));
        assert_eq!(req.header("X-Risk-Penalty"), None);
    }

    #[test]
    fn test_request_rng_is_seeded_and_unlocked() {
        let (a, b) = (state(), state());
        let first = a.request_rng().gen::<u64>();
        assert!(a.rng.try_lock().is_ok());
        assert_eq!(first, b.request_rng().gen::<u64>());
        // Each request draws a fresh seed
        assert_ne!(first, a.request_rng().gen::<u64>());
    }

    #[test]
    fn test_click_with_risk_header() {
        let state = state();
        let (status, body) = call(&state, "POST /api/users/1/click HTTP/1.1\r\nX-Risk-Penalty: 1.0\r\n\r\n");
        assert_eq!(status, 200);
        assert!(body["reward"].as_u64().unwrap() >= 1);
        assert_eq!(body["new_totals"]["clicks"], 1);

        let (status, body) = call(&state, "POST /api/users/1/click HTTP/1.1\r\nX-Risk-Penalty: 0\r\n\r\n");
        assert_eq!(status, 400);
        assert_eq!(body["error"], "bad_request");
    }

    #[test]
    fn test_complete_twice_conflicts() {
        let state = state();
        let req = "POST /api/users/1/habits/10/complete HTTP/1.1\r\n\r\n";
        let (status, body) = call(&state, req);
        assert_eq!(status, 200);
        assert_eq!(body["new_streak"], 1);
        assert_eq!(body["new_achievements"][0], "first_step");

        let (status, body) = call(&state, req);
        assert_eq!(status, 409);
        assert_eq!(body["error"], "already_completed_today");
    }

    #[test]
    fn test_habit_of_another_user() {
        let state = state();
        let (status, _) = call(&state, "POST /api/users/2/habits/10/complete HTTP/1.1\r\n\r\n");
        assert_eq!(status, 403);
        let (status, _) = call(&state, "POST /api/users/1/click HTTP/1.1\r\nX-User-Id: 2\r\n\r\n");
        assert_eq!(status, 403);
    }

    #[test]
    fn test_freeze_routes() {
        let state = state();
        let (status, _) = call(&state, "POST /api/habits/10/freeze/buy HTTP/1.1\r\n\r\n");
        assert_eq!(status, 400);

        let (status, body) = call(&state, "POST /api/habits/10/freeze/buy HTTP/1.1\r\nX-User-Id: 1\r\n\r\n");
        assert_eq!(status, 409);
        assert_eq!(body["error"], "insufficient_points");

        let (status, body) = call(&state, "POST /api/habits/10/freeze/use HTTP/1.1\r\nX-User-Id: 1\r\n\r\n");
        assert_eq!(status, 409);
        assert_eq!(body["error"], "no_freeze_available");

        state.engine().store().credit(UserId::new(1), 100).unwrap();
        let (status, body) = call(&state, "POST /api/habits/10/freeze/buy HTTP/1.1\r\nX-User-Id: 1\r\n\r\n");
        assert_eq!(status, 200);
        assert_eq!(body["habit"]["freeze_count"], 1);

        let (status, body) = call(&state, "POST /api/habits/10/freeze/use HTTP/1.1\r\nX-User-Id: 1\r\n\r\n");
        assert_eq!(status, 200);
        assert_eq!(body["habit"]["is_currently_frozen"], true);
    }

    #[test]
    fn test_leaderboard_and_profile() {
        let state = state();
        state.engine().store().credit(UserId::new(2), 300).unwrap();

        let (status, body) = call(&state, "GET /api/leaderboard/points/all_time?limit=1 HTTP/1.1\r\n\r\n");
        assert_eq!(status, 200);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["user_id"], 2);
        assert_eq!(body[0]["rank"], 1);

        let (status, _) = call(&state, "GET /api/leaderboard/karma/all_time HTTP/1.1\r\n\r\n");
        assert_eq!(status, 400);

        let (status, body) = call(&state, "GET /api/users/2 HTTP/1.1\r\n\r\n");
        assert_eq!(status, 200);
        assert_eq!(body["level"]["current"]["level_name"], "Sprout");

        let (status, _) = call(&state, "GET /api/users/9 HTTP/1.1\r\n\r\n");
        assert_eq!(status, 404);
    }

    #[test]
    fn test_status_and_unknown_route() {
        let state = state();
        let (status, body) = call(&state, "GET /api/status HTTP/1.1\r\n\r\n");
        assert_eq!(status, 200);
        assert_eq!(body["version"], crate::VERSION);
        assert!(body["odds"]["lucky_click"]["chance"].as_f64().is_some());

        let (status, _) = call(&state, "DELETE /api/users/1 HTTP/1.1\r\n\r\n");
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn test_serve_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, Arc::new(state())));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"POST /api/users/1/login HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("\"streak_days\":1"));

        server.abort();
    }
}

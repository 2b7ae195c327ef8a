//! Browser chat front end.
//!
//! Each browser tab creates its own session and drives it through a small
//! JSON API; the page itself is a static shell that renders the transcript.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{OncoError, Result};
use crate::message::Message;
use crate::session::{AgentFactory, Session};

type SessionHandle = Arc<Mutex<Session>>;

struct SessionEntry {
    handle: SessionHandle,
    last_seen: Instant,
}

impl SessionEntry {
    /// Idle past the timeout and not in the middle of a request.
    fn expired(&self, now: Instant, idle_timeout: Duration) -> bool {
        now.duration_since(self.last_seen) > idle_timeout && self.handle.try_lock().is_ok()
    }
}

#[derive(Clone)]
pub struct ChatServer {
    config: Arc<AppConfig>,
    factory: AgentFactory,
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
    idle_timeout: Duration,
}

impl ChatServer {
    pub fn new(config: Arc<AppConfig>, factory: AgentFactory) -> Self {
        let idle_timeout = Duration::from_secs(config.server.session_idle_secs);
        Self {
            config,
            factory,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/health", get(|| async { "ok" }))
            .route("/api/config", get(client_config))
            .route("/api/sessions", post(create_session))
            .route("/api/sessions/:id", get(get_session).delete(delete_session))
            .route("/api/sessions/:id/send", post(send_question))
            .route("/api/sessions/:id/ask", post(ask_sample))
            .route("/api/sessions/:id/clear", post(clear_chat))
            .route("/api/sessions/:id/reset-agent", post(reset_agent))
            .route("/api/sessions/:id/clear-input", post(clear_input))
            .with_state(self.clone())
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, idle_timeout = ?self.idle_timeout, "chat server listening");

        let sweeper = self.clone();
        let sweep = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweeper.idle_timeout.max(Duration::from_secs(1)));
            loop {
                ticker.tick().await;
                sweeper.evict_idle().await;
            }
        });

        let served = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown requested");
                }
            })
            .await;
        sweep.abort();
        served.map_err(|err| OncoError::Protocol(format!("server error: {err}")))?;
        Ok(())
    }

    /// Drop every session that has been idle past the timeout.
    pub async fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !entry.expired(now, self.idle_timeout));
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "idle sessions evicted");
        }
        evicted
    }

    async fn session(&self, id: Uuid) -> std::result::Result<SessionHandle, ApiError> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id).ok_or(ApiError::SessionNotFound)?;
        if entry.expired(now, self.idle_timeout) {
            sessions.remove(&id);
            tracing::info!(session = %id, "idle session expired");
            return Err(ApiError::SessionNotFound);
        }
        entry.last_seen = now;
        Ok(Arc::clone(&entry.handle))
    }
}

#[derive(Debug)]
enum ApiError {
    SessionNotFound,
    Busy,
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::SessionNotFound => (StatusCode::NOT_FOUND, "session not found".to_string()),
            ApiError::Busy => (
                StatusCode::CONFLICT,
                "a question is already being answered for this session".to_string(),
            ),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// A session runs one submission at a time; anything arriving meanwhile is refused.
fn lock(handle: &SessionHandle) -> std::result::Result<MutexGuard<'_, Session>, ApiError> {
    handle.try_lock().map_err(|_| ApiError::Busy)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionView {
    pub id: Uuid,
    pub messages: Vec<Message>,
    pub clear_input: bool,
}

impl SessionView {
    fn capture(id: Uuid, session: &mut Session) -> Self {
        Self {
            id,
            messages: session.transcript().to_vec(),
            clear_input: session.store_mut().take_input_clear(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    pub app_name: String,
    pub tagline: String,
    pub disclaimer: String,
    pub input_placeholder: String,
    pub footer: String,
    pub sample_questions: Vec<String>,
}

async fn client_config(State(state): State<ChatServer>) -> Json<ClientConfig> {
    let branding = &state.config.branding;
    Json(ClientConfig {
        app_name: branding.app_name.clone(),
        tagline: branding.tagline.clone(),
        disclaimer: branding.disclaimer.clone(),
        input_placeholder: branding.input_placeholder.clone(),
        footer: branding.footer.clone(),
        sample_questions: state.config.assistant.sample_questions.clone(),
    })
}

async fn create_session(State(state): State<ChatServer>) -> impl IntoResponse {
    state.evict_idle().await;
    let id = Uuid::new_v4();
    let session = Session::from_config(&state.config, Arc::clone(&state.factory));
    state.sessions.write().await.insert(
        id,
        SessionEntry {
            handle: Arc::new(Mutex::new(session)),
            last_seen: Instant::now(),
        },
    );
    tracing::info!(session = %id, "session started");
    (StatusCode::CREATED, Json(json!({ "id": id })))
}

async fn get_session(
    State(state): State<ChatServer>,
    Path(id): Path<Uuid>,
) -> std::result::Result<Json<SessionView>, ApiError> {
    let handle = state.session(id).await?;
    // Reads wait for an in-flight answer instead of refusing.
    let mut session = handle.lock().await;
    Ok(Json(SessionView::capture(id, &mut session)))
}

async fn delete_session(
    State(state): State<ChatServer>,
    Path(id): Path<Uuid>,
) -> std::result::Result<StatusCode, ApiError> {
    state
        .sessions
        .write()
        .await
        .remove(&id)
        .ok_or(ApiError::SessionNotFound)?;
    tracing::info!(session = %id, "session ended");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    question: String,
}

async fn send_question(
    State(state): State<ChatServer>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendRequest>,
) -> std::result::Result<Json<SessionView>, ApiError> {
    let handle = state.session(id).await?;
    let mut session = lock(&handle)?;
    session.submit(&req.question).await;
    Ok(Json(SessionView::capture(id, &mut session)))
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    index: usize,
}

async fn ask_sample(
    State(state): State<ChatServer>,
    Path(id): Path<Uuid>,
    Json(req): Json<AskRequest>,
) -> std::result::Result<Json<SessionView>, ApiError> {
    let handle = state.session(id).await?;
    let mut session = lock(&handle)?;
    session
        .ask_sample(req.index)
        .await
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;
    Ok(Json(SessionView::capture(id, &mut session)))
}

async fn clear_chat(
    State(state): State<ChatServer>,
    Path(id): Path<Uuid>,
) -> std::result::Result<Json<SessionView>, ApiError> {
    let handle = state.session(id).await?;
    let mut session = lock(&handle)?;
    session.clear_chat();
    Ok(Json(SessionView::capture(id, &mut session)))
}

async fn reset_agent(
    State(state): State<ChatServer>,
    Path(id): Path<Uuid>,
) -> std::result::Result<Json<SessionView>, ApiError> {
    let handle = state.session(id).await?;
    let mut session = lock(&handle)?;
    session.reset_agent();
    Ok(Json(SessionView::capture(id, &mut session)))
}

async fn clear_input(
    State(state): State<ChatServer>,
    Path(id): Path<Uuid>,
) -> std::result::Result<Json<SessionView>, ApiError> {
    let handle = state.session(id).await?;
    let mut session = lock(&handle)?;
    session.store_mut().request_input_clear();
    Ok(Json(SessionView::capture(id, &mut session)))
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

async fn index(State(state): State<ChatServer>) -> Html<String> {
    let branding = &state.config.branding;
    Html(
        PAGE.replace("{{APP_NAME}}", &escape_html(&branding.app_name))
            .replace("{{TAGLINE}}", &escape_html(&branding.tagline))
            .replace("{{DISCLAIMER}}", &escape_html(&branding.disclaimer))
            .replace("{{PLACEHOLDER}}", &escape_html(&branding.input_placeholder))
            .replace("{{FOOTER}}", &escape_html(&branding.footer)),
    )
}

const PAGE: &str = r#"<!doctype html>
<html>
<head>
    <meta charset="utf-8" />
    <title>{{APP_NAME}} - {{TAGLINE}}</title>
    <style>
        body { font-family: 'Segoe UI', sans-serif; background: #f4f6fa; margin: 0; display: flex; }
        aside { width: 240px; padding: 1.5rem; background: #fff; min-height: 100vh; box-shadow: 2px 0 8px rgba(0,0,0,0.04); }
        aside button { display: block; width: 100%; margin-bottom: 0.75rem; }
        main { flex: 1; padding: 1.5rem 2rem; max-width: 960px; }
        .header { background: linear-gradient(to right, #6366f1, #8b5cf6); padding: 1.5rem; border-radius: 16px; color: white; margin-bottom: 2rem; text-align: center; }
        .header h1 { font-size: 2rem; margin: 0 0 0.5rem; }
        .chat { background: white; padding: 2rem; border-radius: 16px; box-shadow: 0 4px 12px rgba(0,0,0,0.05); max-height: 60vh; overflow-y: auto; margin-bottom: 1rem; }
        .row { display: flex; margin-bottom: 1.25rem; }
        .row.user { justify-content: flex-end; }
        .bubble { max-width: 70%; padding: 1rem 1.4rem; line-height: 1.5; border-radius: 18px; white-space: pre-wrap; }
        .bubble.user { background: #4f46e5; color: white; border-bottom-right-radius: 4px; }
        .bubble.assistant { background: #e5e7eb; color: #1f2937; border-bottom-left-radius: 4px; }
        .controls { display: flex; gap: 10px; }
        .controls input { flex: 1; padding: 0.6rem; }
        #samples { margin-bottom: 1rem; }
        #status { color: #6366f1; min-height: 1.5rem; }
        footer { text-align: center; font-size: 14px; color: #4f46e5; margin-top: 2rem; }
    </style>
</head>
<body>
    <aside>
        <h3>{{APP_NAME}}</h3>
        <p>Your AI-powered cancer support companion.</p>
        <button id="clear-chat">Clear Chat</button>
        <button id="reset-agent">Reset Agent</button>
        <div id="notice"></div>
    </aside>
    <main>
        <div class="header">
            <h1>{{APP_NAME}} - {{TAGLINE}}</h1>
            <p>{{DISCLAIMER}}</p>
        </div>
        <div class="chat" id="chat"></div>
        <div id="samples" hidden>
            <h3>Sample Expert Questions</h3>
            <select id="sample-select"><option value="">-- Select --</option></select>
            <button id="ask">Ask {{APP_NAME}}</button>
        </div>
        <div id="status"></div>
        <div class="controls">
            <input id="question" placeholder="{{PLACEHOLDER}}" />
            <button id="send">Send</button>
            <button id="clear-input">Clear Input</button>
        </div>
        <footer><b>{{APP_NAME}}</b><br />{{FOOTER}}</footer>
    </main>
    <script>
        let sessionId = sessionStorage.getItem('session');
        let busy = false;

        async function api(path, body) {
            const opts = { method: body === undefined ? 'GET' : 'POST', headers: { 'content-type': 'application/json' } };
            if (body !== undefined) opts.body = JSON.stringify(body);
            return fetch(`/api/sessions/${sessionId}${path}`, opts);
        }

        async function ensureSession() {
            if (sessionId && (await api('')).ok) return;
            const created = await fetch('/api/sessions', { method: 'POST' }).then(r => r.json());
            sessionId = created.id;
            sessionStorage.setItem('session', sessionId);
        }

        window.addEventListener('pagehide', () => {
            if (sessionId) fetch(`/api/sessions/${sessionId}`, { method: 'DELETE', keepalive: true });
            sessionStorage.removeItem('session');
        });

        function render(view) {
            const chat = document.getElementById('chat');
            chat.replaceChildren(...view.messages.map(m => {
                const row = document.createElement('div');
                row.className = `row ${m.role}`;
                const bubble = document.createElement('div');
                bubble.className = `bubble ${m.role}`;
                bubble.textContent = m.content;
                row.appendChild(bubble);
                return row;
            }));
            chat.scrollTop = chat.scrollHeight;
            document.getElementById('samples').hidden = view.messages.length > 0;
            if (view.clear_input) document.getElementById('question').value = '';
        }

        async function act(path, body, label) {
            if (busy) return;
            busy = true;
            document.querySelectorAll('button').forEach(b => b.disabled = true);
            document.getElementById('status').textContent = label || '';
            try {
                const resp = await api(path, body);
                if (resp.ok) render(await resp.json());
            } finally {
                busy = false;
                document.querySelectorAll('button').forEach(b => b.disabled = false);
                document.getElementById('status').textContent = '';
            }
        }

        document.getElementById('send').onclick = () => {
            const question = document.getElementById('question').value;
            if (!question.trim()) return;
            act('/send', { question }, '{{APP_NAME}} is thinking...');
        };
        document.getElementById('question').addEventListener('keydown', e => {
            if (e.key === 'Enter') document.getElementById('send').click();
        });
        document.getElementById('ask').onclick = () => {
            const value = document.getElementById('sample-select').value;
            if (value === '') return;
            act('/ask', { index: Number(value) }, '{{APP_NAME}} is thinking...');
        };
        document.getElementById('clear-input').onclick = () => act('/clear-input', {});
        document.getElementById('clear-chat').onclick = async () => {
            await act('/clear', {});
            document.getElementById('notice').textContent = 'Chat cleared.';
        };
        document.getElementById('reset-agent').onclick = async () => {
            await act('/reset-agent', {});
            document.getElementById('notice').textContent = 'Agent has been reset.';
        };

        (async () => {
            const cfg = await fetch('/api/config').then(r => r.json());
            const select = document.getElementById('sample-select');
            cfg.sample_questions.forEach((q, i) => {
                const opt = document.createElement('option');
                opt.value = String(i);
                opt.textContent = q;
                select.appendChild(opt);
            });
            await ensureSession();
            render(await api('').then(r => r.json()));
        })();
    </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_in_branding() {
        assert_eq!(
            escape_html(r#"<b>"Onco" & 'Ally'</b>"#),
            "&lt;b&gt;&quot;Onco&quot; &amp; &#39;Ally&#39;&lt;/b&gt;"
        );
    }
}

//! Per-role chat WebSocket.
//!
//! `GET /api/{role}/chat?token=` upgrades to a WebSocket, authenticates
//! the query-param token, and relays JSON frames between the client and
//! the external agent runtime. The principal's identity rides on every
//! forwarded prompt as explicit fields; the runtime owns tool-level
//! authorization. Close codes: 4001 unauthenticated, 4003 wrong role.

use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::{CloseCode, CloseReason, Message};
use futures_util::StreamExt;
use log::{debug, info, warn};
use serde::Deserialize;
use uuid::Uuid;

use shared::dtos::chat::{ClientChatMessage, ServerChatFrame};
use shared::models::enums::UserRole;

use crate::auth::verify_token;
use crate::services::audit::{write_audit_event_pooled, AuditDraft};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenParam {
    pub token: Option<String>,
}

fn close_reason(code: u16, description: &str) -> CloseReason {
    CloseReason {
        code: CloseCode::Other(code),
        description: Some(description.to_string()),
    }
}

async fn send_frame(session: &mut actix_ws::Session, frame: &ServerChatFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(text) => session.text(text).await.is_ok(),
        Err(_) => false,
    }
}

fn error_frame(message: &str) -> ServerChatFrame {
    ServerChatFrame {
        kind: "error".to_string(),
        content: serde_json::json!(message),
    }
}

/// `GET /api/{role}/chat`
pub async fn chat(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<String>,
    query: web::Query<TokenParam>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;
    let requested_role = path.into_inner();
    let token = query.token.clone();
    let state = data.clone();

    actix_web::rt::spawn(async move {
        // Authenticate after the handshake so the close code reaches the
        // client.
        let principal = match token {
            Some(token) => match verify_token(&state, &token).await {
                Ok(principal) => principal,
                Err(e) => {
                    debug!("Chat auth failed: {}", e);
                    let _ = session
                        .close(Some(close_reason(4001, "unauthenticated")))
                        .await;
                    return;
                }
            },
            None => {
                let _ = session
                    .close(Some(close_reason(4001, "unauthenticated")))
                    .await;
                return;
            }
        };

        let role_matches = UserRole::parse(&requested_role)
            .map(|role| role == principal.role)
            .unwrap_or(false);
        if !role_matches {
            let _ = session
                .close(Some(close_reason(4003, "wrong role for this channel")))
                .await;
            return;
        }

        let session_id = format!("chat-{}", Uuid::new_v4());
        info!(
            "Chat session {} opened for {} ({})",
            session_id, principal.user_id, principal.role
        );

        while let Some(message) = msg_stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let parsed: Result<ClientChatMessage, _> = serde_json::from_str(&text);
                    let client_message = match parsed {
                        Ok(m) if m.kind == "message" => m,
                        Ok(_) => {
                            let _ = send_frame(
                                &mut session,
                                &error_frame("unsupported message type"),
                            )
                            .await;
                            continue;
                        }
                        Err(_) => {
                            let _ = send_frame(
                                &mut session,
                                &error_frame("messages must be JSON {type, content}"),
                            )
                            .await;
                            continue;
                        }
                    };

                    // Safety classification fails open by contract.
                    let verdict = state.llm.check_input(&client_message.content).await;
                    if !verdict.is_safe {
                        let _ = write_audit_event_pooled(
                            &state.lending_pool,
                            AuditDraft::new("safety_block")
                                .user(&principal.user_id, principal.role.as_str())
                                .session(&session_id)
                                .data(serde_json::json!({"categories": verdict.categories})),
                        )
                        .await;
                        let _ = send_frame(
                            &mut session,
                            &error_frame("message rejected by safety policy"),
                        )
                        .await;
                        continue;
                    }

                    let _ = write_audit_event_pooled(
                        &state.lending_pool,
                        AuditDraft::new("chat_message")
                            .user(&principal.user_id, principal.role.as_str())
                            .session(&session_id)
                            .data(serde_json::json!({
                                "length": client_message.content.len(),
                            })),
                    )
                    .await;

                    match state
                        .agent
                        .run_prompt(
                            principal.role.as_str(),
                            &principal.user_id,
                            &session_id,
                            &client_message.content,
                        )
                        .await
                    {
                        Ok(frames) => {
                            for frame in &frames {
                                if !send_frame(&mut session, frame).await {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            warn!("Agent runtime error on session {}: {}", session_id, e);
                            let _ = send_frame(
                                &mut session,
                                &error_frame("the assistant is unavailable right now"),
                            )
                            .await;
                        }
                    }
                }
                Ok(Message::Ping(bytes)) => {
                    if session.pong(&bytes).await.is_err() {
                        return;
                    }
                }
                Ok(Message::Close(reason)) => {
                    debug!("Chat session {} closed: {:?}", session_id, reason);
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Chat session {} stream error: {}", session_id, e);
                    return;
                }
            }
        }
    });

    Ok(response)
}

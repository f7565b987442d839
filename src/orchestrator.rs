//! Top-level request coordinator.
//!
//! One `process` call runs the full turn: resolve identity, load session,
//! score trust, settle the persona, classify the utterance, dispatch any
//! intent, render the spoken response, persist the session, publish
//! telemetry, and (when the multi-room routers are wired) deliver TTS to
//! the selected room. Persona selection, dispatch, and routing are
//! best-effort: the only error a caller ever sees is empty input.

use crate::agent::{AccessDenial, HalstonAgent, PersonaAgent, ScarletAgent};
use crate::error::{HalcyonError, Result};
use crate::identity::IdentityLookup;
use crate::intents::{IntentContext, IntentDispatcher, IntentResult};
use crate::persona::{Persona, PersonaStateMachine, ReassuranceSignal, ThreatSignal};
use crate::router::{IntentClassification, MessageRouter};
use crate::session::{SessionState, SessionStore};
use crate::telemetry::EventBus;
use crate::trust::{PersonaBias, Role, TrustDecision, TrustInputs, TrustScorer};
use crate::voice::{ConversationRouter, OutputRouter, SpeechSynthesizer};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Multi-room routing collaborators, wired when the voice pipeline runs.
pub struct VoiceRouting {
    /// Room selection and follow-me state.
    pub conversation: Arc<ConversationRouter>,
    /// Privacy/DND-aware audio delivery.
    pub output: Arc<OutputRouter>,
    /// Persona-aware TTS engine seam.
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

/// Collaborators required to build an [`Orchestrator`].
pub struct OrchestratorDeps {
    /// Identity resolution seam.
    pub identity: Arc<dyn IdentityLookup>,
    /// Trust scorer.
    pub scorer: TrustScorer,
    /// Intent classifier.
    pub router: MessageRouter,
    /// Intent dispatch table.
    pub dispatcher: IntentDispatcher,
    /// Persona state machine.
    pub state_machine: PersonaStateMachine,
    /// Calm persona agent.
    pub halston: HalstonAgent,
    /// Security persona agent.
    pub scarlet: ScarletAgent,
    /// Shared session store.
    pub sessions: SessionStore,
    /// Telemetry bus.
    pub events: EventBus,
    /// Optional multi-room routing bundle.
    pub voice: Option<VoiceRouting>,
}

/// Primary runtime coordinating personas and intent execution.
pub struct Orchestrator {
    identity: Arc<dyn IdentityLookup>,
    scorer: TrustScorer,
    router: MessageRouter,
    dispatcher: IntentDispatcher,
    state_machine: Mutex<PersonaStateMachine>,
    halston: Mutex<HalstonAgent>,
    scarlet: Mutex<ScarletAgent>,
    sessions: SessionStore,
    events: EventBus,
    voice: Option<VoiceRouting>,
}

impl Orchestrator {
    /// Assemble the runtime from its collaborators.
    #[must_use]
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            identity: deps.identity,
            scorer: deps.scorer,
            router: deps.router,
            dispatcher: deps.dispatcher,
            state_machine: Mutex::new(deps.state_machine),
            halston: Mutex::new(deps.halston),
            scarlet: Mutex::new(deps.scarlet),
            sessions: deps.sessions,
            events: deps.events,
            voice: deps.voice,
        }
    }

    /// Process a text request, returning the response and active persona.
    ///
    /// # Errors
    ///
    /// Fails only on whitespace-only input; everything downstream is
    /// converted into a spoken failure instead.
    pub async fn process(
        &self,
        user_text: &str,
        speaker_temp_id: &str,
        room_hint: Option<&str>,
    ) -> Result<(String, Persona)> {
        if user_text.trim().is_empty() {
            return Err(HalcyonError::InvalidInput(
                "user_text must be non-empty".into(),
            ));
        }

        let (stable_uuid, role_hint) = self.identity.resolve(speaker_temp_id, 1.0);
        let mut session = match self
            .sessions
            .load(stable_uuid.as_deref(), speaker_temp_id)
            .await
        {
            Ok(session) => session,
            Err(err) => {
                warn!("session load failed, starting fresh: {err}");
                SessionState {
                    speaker_uuid: stable_uuid.clone(),
                    last_seen_ts: crate::clock::epoch_secs(),
                    ..SessionState::default()
                }
            }
        };

        let inputs = TrustInputs {
            speaker_id: stable_uuid.clone(),
            voice_match: session.voice_confidence,
            face_match: session.face_confidence,
            prior_score: session.last_trust,
            context_mode: session.context_mode,
            reassurance: session.reassurance,
            threat: session.threat,
            last_update_ts: session.last_seen_ts,
            now_ts: crate::clock::epoch_secs(),
        };
        let decision = self.scorer.score(&inputs, normalize_role_hint(role_hint));
        let persona = self.select_persona(&session, &decision);

        let classification = self.router.classify(user_text, decision.role);
        let intent_result = match &classification.intent {
            Some(intent) => Some(
                self.dispatch_intent(intent, &classification, &decision, &session, speaker_temp_id, persona)
                    .await,
            ),
            None => None,
        };

        let response = self.render_response(&session, persona, user_text, &classification, intent_result.as_ref());

        let success = intent_result.as_ref().is_none_or(|result| result.ok);
        session.last_trust = decision.score;
        session.last_persona = persona.as_str().to_owned();
        session.last_intent = classification.intent.clone();
        session.last_response = Some(response.clone());
        session.conversation_turn += 1;
        if let Err(err) = self
            .sessions
            .save(&mut session, stable_uuid.as_deref(), speaker_temp_id)
            .await
        {
            warn!("session save failed: {err}");
        }

        self.publish_turn_events(&session, &decision, &classification, success, persona, user_text);

        if let Some(voice) = &self.voice {
            self.route_speech(voice, stable_uuid.as_deref(), speaker_temp_id, room_hint, persona, &response)
                .await;
        }

        Ok((response, persona))
    }

    // ── turn steps ──────────────────────────────────────────────────────

    fn select_persona(&self, session: &SessionState, decision: &TrustDecision) -> Persona {
        let mut machine = self
            .state_machine
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut persona = machine.state();
        let mut source = "state_machine";

        match decision.persona_bias {
            PersonaBias::Scarlet => {
                let severity = (0.4 + (100.0 - decision.score) / 100.0).min(1.0);
                if let Ok(signal) =
                    ThreatSignal::new(severity, "trust_bias", "Trust bias escalation")
                {
                    persona = machine.register_threat(signal);
                    source = "trust_bias";
                }
            }
            PersonaBias::Halston => {
                let confidence = (0.4 + decision.score / 150.0).min(1.0);
                if let Ok(signal) = ReassuranceSignal::new(confidence, "trust_bias") {
                    persona = machine.register_reassurance(signal);
                    source = "trust_bias";
                }
            }
            PersonaBias::Neutral => {}
        }

        // A SCARLET hangover without sensitive clearance and without a
        // fresh SCARLET bias gets nudged back toward HALSTON.
        if !decision.allow_sensitive
            && persona == Persona::Scarlet
            && decision.persona_bias != PersonaBias::Scarlet
            && let Ok(signal) = ReassuranceSignal::new(0.6, "sensitivity_guard")
        {
            persona = machine.register_reassurance(signal);
            source = "sensitivity_guard";
        }

        self.events.publish(
            "orch/active_persona",
            json!({
                "persona": persona.label(),
                "source": source,
                "conversation_turn": session.conversation_turn,
                "speaker_uuid": session.speaker_uuid,
            }),
        );
        persona
    }

    async fn dispatch_intent(
        &self,
        intent: &str,
        classification: &IntentClassification,
        decision: &TrustDecision,
        session: &SessionState,
        speaker_temp_id: &str,
        persona: Persona,
    ) -> IntentResult {
        let context = IntentContext {
            role: decision.role,
            allow_sensitive: decision.allow_sensitive,
            mode: session.context_mode,
            speaker_uuid: session.speaker_uuid.clone(),
            session_id: Some(speaker_temp_id.to_owned()),
            persona,
        };
        debug!("dispatching intent {intent} for role {}", decision.role.as_str());
        self.dispatcher
            .handle(intent, &classification.slots, &context)
            .await
    }

    fn render_response(
        &self,
        session: &SessionState,
        persona: Persona,
        user_text: &str,
        classification: &IntentClassification,
        intent_result: Option<&IntentResult>,
    ) -> String {
        let mut metadata = json!({
            "session": {
                "speaker_uuid": session.speaker_uuid,
                "context_mode": session.context_mode.as_str(),
                "conversation_turn": session.conversation_turn,
                "last_trust": session.last_trust,
            },
            "slots": Value::Object(classification.slots.clone()),
            "intent_confidence": classification.confidence,
        });
        if let (Some(result), Value::Object(map)) = (intent_result, &mut metadata) {
            map.insert(
                "intent_result".to_owned(),
                json!({"ok": result.ok, "spoken": result.spoken, "details": result.details}),
            );
        }

        let mut halston = self
            .halston
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut scarlet = self
            .scarlet
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let agent: &mut dyn PersonaAgent = match persona {
            Persona::Halston => &mut *halston,
            Persona::Scarlet => &mut *scarlet,
        };

        let Some(result) = intent_result else {
            return agent.generate_response(user_text, None, &metadata);
        };
        if result.ok {
            let response =
                agent.generate_response(user_text, classification.intent.as_deref(), &metadata);
            let spoken = result.spoken.trim();
            return format!("{response} {spoken}").trim().to_owned();
        }
        let reason = if result.spoken.is_empty() {
            "The request could not be completed."
        } else {
            &result.spoken
        };
        agent.build_denied_response(&AccessDenial::with_reason(reason))
    }

    fn publish_turn_events(
        &self,
        session: &SessionState,
        decision: &TrustDecision,
        classification: &IntentClassification,
        success: bool,
        persona: Persona,
        user_text: &str,
    ) {
        self.events.publish(
            "orch/trust",
            json!({
                "score": (decision.score * 100.0).round() / 100.0,
                "role": decision.role.as_str(),
                "allow_sensitive": decision.allow_sensitive,
                "persona_bias": decision.persona_bias.as_str(),
                "speaker_uuid": session.speaker_uuid,
            }),
        );
        self.events.publish(
            "orch/intent",
            json!({
                "intent": classification.intent,
                "slots": Value::Object(classification.slots.clone()),
                "success": classification.intent.as_ref().map(|_| success),
                "persona": persona.label(),
                "excerpt": excerpt(user_text, 160),
                "speaker_uuid": session.speaker_uuid,
            }),
        );
    }

    /// Deliver the response as speech in the selected room. Routing
    /// failures never break the turn.
    async fn route_speech(
        &self,
        voice: &VoiceRouting,
        uuid: Option<&str>,
        temp_id: &str,
        room_hint: Option<&str>,
        persona: Persona,
        response: &str,
    ) {
        let room_id = match voice
            .conversation
            .select_active_room(uuid, temp_id, room_hint)
            .await
        {
            Ok(room_id) => room_id,
            Err(err) => {
                warn!("room selection failed: {err}");
                return;
            }
        };

        if voice.conversation.can_speak_in(&room_id, persona) {
            match voice.synthesizer.synth(persona, response).await {
                Ok(wav) => {
                    voice.output.route(persona, uuid, &room_id, &wav).await;
                }
                Err(err) => warn!("TTS synthesis failed: {err}"),
            }
        }

        if let Err(err) = voice.conversation.update_last_room(uuid, &room_id).await {
            warn!("failed to update last room: {err}");
        }
    }
}

fn normalize_role_hint(hint: Option<Role>) -> Option<Role> {
    hint.filter(|role| {
        matches!(
            role,
            Role::Owner | Role::Household | Role::Guest | Role::Unknown
        )
    })
}

fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

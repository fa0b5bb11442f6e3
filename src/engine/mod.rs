use crate::chatwoot::ChatwootClient;
use crate::errors::ZapdeskResult;
use crate::store::{Conversation, ConversationStatus, ConversationStore, Direction};
use crate::twilio::InboundMessage;
use std::sync::Arc;
use tracing::{error, info};

pub const MAIN_MENU: &str = "Olá! Bem-vindo(a) à Private. Por favor, escolha uma opção:\n\n*1.* Consultar status do meu seguro.\n*2.* Falar com um atendente.";
pub const INSURANCE_STATUS: &str = "O status do seu seguro é: ATIVO. Validade até 31/12/2025.";
pub const INVALID_OPTION: &str = "Opção inválida. Por favor, responda com *1* ou *2*.";
pub const TRANSFER_NOTICE: &str =
    "Ok, um momento enquanto eu te transfiro para um de nossos especialistas.";
pub const HANDOFF_APOLOGY: &str = "Desculpe, estamos com um problema em nosso sistema de atendimento. Por favor, tente novamente em alguns instantes.";
/// Stored body for an agent message that carried only media.
pub const AGENT_MEDIA_PLACEHOLDER: &str = "[Mídia enviada pelo agente]";

/// What the inbound webhook should answer, rendered as TwiML by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundReply {
    /// Reply with one message element.
    Message(String),
    /// Empty TwiML document; silent ack.
    Ack,
}

/// The conversation state machine. Transitions are triggered only by inbound
/// user messages; agent replies flow through the gateway without touching it.
pub struct ConversationEngine {
    store: Arc<ConversationStore>,
    chatwoot: Arc<ChatwootClient>,
}

impl ConversationEngine {
    pub fn new(store: Arc<ConversationStore>, chatwoot: Arc<ChatwootClient>) -> Self {
        Self { store, chatwoot }
    }

    /// Process one inbound user message and decide the reply.
    ///
    /// A first message from an unseen number only creates the conversation
    /// and answers with the menu; it is not routed through the dispatcher
    /// and not logged as a message row.
    pub async fn on_inbound_message(&self, msg: &InboundMessage) -> ZapdeskResult<InboundReply> {
        let (conversation, created) = self.store.find_or_create(&msg.from)?;
        if created {
            return Ok(InboundReply::Message(MAIN_MENU.to_string()));
        }

        self.store.append_message(
            conversation.id,
            &msg.body,
            Direction::Inbound,
            msg.message_sid.as_deref(),
        )?;

        match conversation.status() {
            Some(ConversationStatus::AwaitingMenuResponse) => {
                self.handle_menu_choice(msg, &conversation).await
            }
            Some(ConversationStatus::WithAgent) => {
                self.forward_to_helpdesk(msg, &conversation).await;
                Ok(InboundReply::Ack)
            }
            None => {
                error!(
                    "conversation {} has unknown status {:?}, resetting to menu",
                    conversation.id, conversation.status_raw
                );
                self.store
                    .set_status(conversation.id, ConversationStatus::AwaitingMenuResponse)?;
                Ok(InboundReply::Message(MAIN_MENU.to_string()))
            }
        }
    }

    async fn handle_menu_choice(
        &self,
        msg: &InboundMessage,
        conversation: &Conversation,
    ) -> ZapdeskResult<InboundReply> {
        match msg.body.as_str() {
            "1" => {
                // Re-write the status so the user can pick again; kept as an
                // explicit write, not a no-op.
                self.store
                    .set_status(conversation.id, ConversationStatus::AwaitingMenuResponse)?;
                Ok(InboundReply::Message(INSURANCE_STATUS.to_string()))
            }
            "2" => Ok(self.initiate_handoff(conversation).await),
            _ => Ok(InboundReply::Message(INVALID_OPTION.to_string())),
        }
    }

    /// Hand the conversation off to a live agent.
    ///
    /// Failures never escape: the conversation stays untouched and the user
    /// gets the apology text.
    async fn initiate_handoff(&self, conversation: &Conversation) -> InboundReply {
        match self.run_handoff(conversation).await {
            Ok(remote_conversation_id) => {
                info!(
                    "conversation {} transferred to Chatwoot conversation {}",
                    conversation.id, remote_conversation_id
                );
                InboundReply::Message(TRANSFER_NOTICE.to_string())
            }
            Err(e) => {
                error!("chatwoot handoff failed: {}", e);
                InboundReply::Message(HANDOFF_APOLOGY.to_string())
            }
        }
    }

    async fn run_handoff(&self, conversation: &Conversation) -> ZapdeskResult<i64> {
        // Idempotent contact resolution: reuse an existing contact, create
        // one otherwise.
        let contact_id = match self.chatwoot.search_contact(&conversation.from_number).await? {
            Some(id) => id,
            None => self.chatwoot.create_contact(&conversation.from_number).await?,
        };

        // Every handoff opens a fresh remote conversation. A contact created
        // here survives even if this next call fails; that partial remote
        // state is not rolled back and the search above picks it up on retry.
        let remote_conversation_id = self.chatwoot.create_conversation(contact_id).await?;

        self.store
            .record_handoff(conversation.id, contact_id, remote_conversation_id)?;
        Ok(remote_conversation_id)
    }

    /// Relay a message from a user already talking to an agent. Failures are
    /// logged and swallowed; the message is dropped on helpdesk outage.
    async fn forward_to_helpdesk(&self, msg: &InboundMessage, conversation: &Conversation) {
        let Some(remote_id) = conversation.chatwoot_conversation_id else {
            error!(
                "conversation {} is with_agent but has no remote conversation id",
                conversation.id
            );
            return;
        };
        info!("forwarding message to Chatwoot conversation {}", remote_id);

        let result = match msg.media.first() {
            Some(media) => {
                self.chatwoot
                    .forward_attachment(remote_id, &media.url, &media.content_type, &msg.body)
                    .await
            }
            None => self.chatwoot.forward_message(remote_id, &msg.body).await,
        };
        if let Err(e) = result {
            error!("failed to forward message to Chatwoot: {}", e);
        }
    }
}

//! ACL message envelope exchanged between agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{AgentId, Performative};

/// One inter-agent message. Treated as immutable once built; routing works on
/// clones when metadata has to be filled in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ACLMessage {
    /// Creation time; stamped on arrival when the sender left it out
    #[serde(rename = "ts", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Communicative act
    #[serde(rename = "perf", default)]
    pub performative: Performative,
    /// Sender agent ID
    pub sender: AgentId,
    /// Base address of the sender's agency
    #[serde(rename = "agencys", default)]
    pub agency_sender: String,
    /// Receiver agent ID
    pub receiver: AgentId,
    /// Base address of the receiver's agency
    #[serde(rename = "agencyr", default)]
    pub agency_receiver: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "prot", default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,
    #[serde(rename = "lang", default, skip_serializing_if = "String::is_empty")]
    pub language: String,
    #[serde(rename = "ont", default, skip_serializing_if = "String::is_empty")]
    pub ontology: String,
    #[serde(rename = "convid", default, skip_serializing_if = "String::is_empty")]
    pub conversation_id: String,
    #[serde(rename = "replywith", default, skip_serializing_if = "String::is_empty")]
    pub reply_with: String,
    #[serde(rename = "inreplyto", default, skip_serializing_if = "String::is_empty")]
    pub in_reply_to: String,
    #[serde(rename = "replyby", default, skip_serializing_if = "Option::is_none")]
    pub reply_by: Option<DateTime<Utc>>,
    /// Set on the single retry copy of an undeliverable message
    #[serde(rename = "redeliv", default)]
    pub redelivery: bool,
}

impl ACLMessage {
    /// Create an `inform` message.
    pub fn new(sender: AgentId, receiver: AgentId, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            performative: Performative::Inform,
            sender,
            agency_sender: String::new(),
            receiver,
            agency_receiver: String::new(),
            content: content.into(),
            protocol: String::new(),
            language: String::new(),
            ontology: String::new(),
            conversation_id: String::new(),
            reply_with: String::new(),
            in_reply_to: String::new(),
            reply_by: None,
            redelivery: false,
        }
    }

    /// Build a reply addressed back to the sender, continuing the conversation.
    pub fn reply(&self, performative: Performative, content: impl Into<String>) -> Self {
        let mut reply = Self::new(self.receiver, self.sender, content);
        reply.performative = performative;
        reply.agency_receiver = self.agency_sender.clone();
        reply.protocol = self.protocol.clone();
        reply.language = self.language.clone();
        reply.ontology = self.ontology.clone();
        reply.conversation_id = self.conversation_id.clone();
        reply.in_reply_to = self.reply_with.clone();
        reply
    }

    /// Copy used for the one permitted redelivery attempt.
    pub fn for_redelivery(&self) -> Self {
        Self {
            redelivery: true,
            ..self.clone()
        }
    }

    /// Copy with routing metadata filled in for forwarding to another node.
    pub fn stamped(&self, own_address: &str, receiver_address: &str) -> Self {
        let mut out = self.clone();
        if out.agency_sender.is_empty() {
            out.agency_sender = own_address.to_string();
        }
        out.agency_receiver = receiver_address.to_string();
        out
    }

    /// True if the message entered this node from another agency.
    pub fn is_remote_origin(&self, own_address: &str) -> bool {
        !self.agency_sender.is_empty() && self.agency_sender != own_address
    }
}

/// Builder for ACL messages with fluent API.
pub struct AclBuilder {
    sender: AgentId,
    receiver: Option<AgentId>,
    performative: Performative,
    content: String,
    protocol: String,
    language: String,
    ontology: String,
    conversation_id: Option<String>,
    reply_with: String,
    in_reply_to: String,
    reply_by: Option<DateTime<Utc>>,
}

impl AclBuilder {
    /// Start building a message from an agent.
    pub fn from(sender: AgentId) -> Self {
        Self {
            sender,
            receiver: None,
            performative: Performative::Inform,
            content: String::new(),
            protocol: String::new(),
            language: String::new(),
            ontology: String::new(),
            conversation_id: None,
            reply_with: String::new(),
            in_reply_to: String::new(),
            reply_by: None,
        }
    }

    pub fn to(mut self, receiver: AgentId) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn performative(mut self, performative: Performative) -> Self {
        self.performative = performative;
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn ontology(mut self, ontology: impl Into<String>) -> Self {
        self.ontology = ontology.into();
        self
    }

    pub fn conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn reply_with(mut self, token: impl Into<String>) -> Self {
        self.reply_with = token.into();
        self
    }

    pub fn in_reply_to(mut self, token: impl Into<String>) -> Self {
        self.in_reply_to = token.into();
        self
    }

    pub fn reply_by(mut self, deadline: DateTime<Utc>) -> Self {
        self.reply_by = Some(deadline);
        self
    }

    /// Build the message. A fresh conversation id is generated if none was set.
    pub fn build(self) -> Result<ACLMessage, &'static str> {
        let receiver = self.receiver.ok_or("Receiver is required")?;

        let mut msg = ACLMessage::new(self.sender, receiver, self.content);
        msg.performative = self.performative;
        msg.protocol = self.protocol;
        msg.language = self.language;
        msg.ontology = self.ontology;
        msg.conversation_id = self
            .conversation_id
            .unwrap_or_else(|| ulid::Ulid::new().to_string());
        msg.reply_with = self.reply_with;
        msg.in_reply_to = self.in_reply_to;
        msg.reply_by = self.reply_by;
        Ok(msg)
    }
}

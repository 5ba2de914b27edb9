/// A chat message relayed by the hub.
///
/// Both fields are client-supplied and untrusted. Messages are never stored;
/// one value is built per `send_message` call and pushed to each recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub user_name: String,
    pub body: String,
}

impl ChatMessage {
    pub fn new(user_name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            body: body.into(),
        }
    }
}

//! JID helpers: party classification and phone extraction.
//!
//! Addresses look like `5511999990000:12@s.whatsapp.net` (individual, with an
//! optional device suffix), `1234-5678@g.us` (group) or `status@broadcast`.

/// Placeholder party for the account's own side of a conversation.
pub const SELF_PARTY: &str = "me";

/// What kind of remote endpoint a JID addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyKind {
    Individual,
    Group,
    Broadcast,
    Other,
}

/// Classify a JID by its domain suffix.
pub fn classify(jid: &str) -> PartyKind {
    if jid.ends_with("@s.whatsapp.net") {
        PartyKind::Individual
    } else if jid.ends_with("@g.us") {
        PartyKind::Group
    } else if jid.ends_with("@broadcast") {
        PartyKind::Broadcast
    } else {
        PartyKind::Other
    }
}

/// Extract the bare phone number from an account JID, dropping the device
/// suffix and domain.
pub fn phone_part(jid: &str) -> &str {
    let jid = jid.split(':').next().unwrap_or(jid);
    jid.split('@').next().unwrap_or(jid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_domain() {
        assert_eq!(classify("5511999990000@s.whatsapp.net"), PartyKind::Individual);
        assert_eq!(classify("1234-5678@g.us"), PartyKind::Group);
        assert_eq!(classify("status@broadcast"), PartyKind::Broadcast);
        assert_eq!(classify("me"), PartyKind::Other);
    }

    #[test]
    fn phone_part_strips_device_and_domain() {
        assert_eq!(phone_part("5511999990000:12@s.whatsapp.net"), "5511999990000");
        assert_eq!(phone_part("5511999990000@s.whatsapp.net"), "5511999990000");
        assert_eq!(phone_part("5511999990000"), "5511999990000");
    }
}

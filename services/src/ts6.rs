//! TS6 boundary encoding for the services link
//!
//! SASL and SVSLOGIN ride ENCAP frames addressed to a server-name mask.
//! UIDs cross this boundary in TS6 form: a SID (digit plus two
//! alphanumerics) followed by six alphanumerics.

use oxircd_core::{Message, MessageType, Prefix};

/// Whether a string is a well-formed TS6 SID
pub fn valid_sid(sid: &str) -> bool {
    let bytes = sid.as_bytes();
    bytes.len() == 3
        && bytes[0].is_ascii_digit()
        && bytes[1..].iter().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Whether a string is a well-formed TS6 UID
pub fn valid_uid(uid: &str) -> bool {
    let bytes = uid.as_bytes();
    bytes.len() == 9
        && bytes[0].is_ascii_digit()
        && bytes[1..]
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Build an ENCAP frame: `:SID ENCAP <mask> <cmd> <args…>`
pub fn encap(sid: &str, mask: &str, cmd: &str, args: Vec<String>) -> Message {
    let mut params = vec![mask.to_string(), cmd.to_string()];
    params.extend(args);
    Message::with_prefix(Prefix::Server(sid.to_string()), MessageType::Encap, params)
}

/// SASL host-information frame (`H`): temp UID, agent UID, host, IP
pub fn sasl_host_info(
    sid: &str,
    mask: &str,
    source_uid: &str,
    agent_uid: &str,
    host: &str,
    ip: &str,
) -> Message {
    encap(
        sid,
        mask,
        "SASL",
        vec![
            source_uid.to_string(),
            agent_uid.to_string(),
            "H".to_string(),
            host.to_string(),
            ip.to_string(),
        ],
    )
}

/// SASL initiation frame (`S`): the chosen mechanism
pub fn sasl_initiate(
    sid: &str,
    mask: &str,
    source_uid: &str,
    agent_uid: &str,
    mechanism: &str,
) -> Message {
    encap(
        sid,
        mask,
        "SASL",
        vec![
            source_uid.to_string(),
            agent_uid.to_string(),
            "S".to_string(),
            mechanism.to_string(),
        ],
    )
}

/// SASL client-data frame (`C`): one base64 blob from the client
pub fn sasl_client_data(
    sid: &str,
    mask: &str,
    source_uid: &str,
    agent_uid: &str,
    data: &str,
) -> Message {
    encap(
        sid,
        mask,
        "SASL",
        vec![
            source_uid.to_string(),
            agent_uid.to_string(),
            "C".to_string(),
            data.to_string(),
        ],
    )
}

/// SASL done frame (`D A`): the client aborted
pub fn sasl_abort(sid: &str, mask: &str, source_uid: &str, agent_uid: &str) -> Message {
    encap(
        sid,
        mask,
        "SASL",
        vec![
            source_uid.to_string(),
            agent_uid.to_string(),
            "D".to_string(),
            "A".to_string(),
        ],
    )
}

/// A decoded inbound SASL frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslFrame {
    /// UID of the agent that sent the frame
    pub agent: String,
    /// UID of the target connection
    pub target: String,
    /// Frame mode: C, D, or M
    pub mode: char,
    /// Frame payload
    pub data: Vec<String>,
}

/// Decode the SASL portion of an ENCAP payload
/// (`<agent_uid> <target_uid> <mode> <data…>`)
pub fn parse_sasl(params: &[String]) -> Option<SaslFrame> {
    if params.len() < 3 {
        return None;
    }
    let mode = params[2].chars().next()?;
    if params[2].len() != 1 {
        return None;
    }
    Some(SaslFrame {
        agent: params[0].clone(),
        target: params[1].clone(),
        mode,
        data: params[3..].to_vec(),
    })
}

/// A decoded inbound SVSLOGIN frame. Fields holding `*` mean unchanged;
/// an account of `0` means log out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvsloginFrame {
    /// UID of the target connection
    pub target: String,
    pub nick: String,
    pub ident: String,
    pub cloak: String,
    pub account: String,
}

/// Decode the SVSLOGIN portion of an ENCAP payload
/// (`<target_uid> <nick|*> <ident|*> <cloak|*> <account|0>`)
pub fn parse_svslogin(params: &[String]) -> Option<SvsloginFrame> {
    if params.len() < 5 {
        return None;
    }
    Some(SvsloginFrame {
        target: params[0].clone(),
        nick: params[1].clone(),
        ident: params[2].clone(),
        cloak: params[3].clone(),
        account: params[4].clone(),
    })
}

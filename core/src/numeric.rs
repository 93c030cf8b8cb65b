//! IRC numeric replies as defined in RFC 1459 and IRCv3

use crate::Message;

/// IRC numeric reply codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericReply {
    // Channel state
    RplUmodeIs = 221,
    RplChannelModeIs = 324,
    RplCreationTime = 329,
    RplNoTopic = 331,
    RplTopic = 332,
    RplTopicWhoTime = 333,
    RplExceptList = 348,
    RplEndOfExceptList = 349,
    RplNameReply = 353,
    RplEndOfNames = 366,
    RplBanList = 367,
    RplEndOfBanList = 368,

    // Error replies
    ErrNoSuchNick = 401,
    ErrNoSuchChannel = 403,
    ErrCannotSendToChan = 404,
    ErrUserNotInChannel = 441,
    ErrNotOnChannel = 442,
    ErrNeedMoreParams = 461,
    ErrAlreadyRegistered = 462,
    ErrChannelIsFull = 471,
    ErrUnknownMode = 472,
    ErrInviteOnlyChan = 473,
    ErrBannedFromChan = 474,
    ErrBadChannelKey = 475,
    ErrChanOpPrivsNeeded = 482,
    ErrUModeUnknownFlag = 501,

    // Account and SASL (IRCv3)
    RplLoggedIn = 900,
    RplLoggedOut = 901,
    RplSaslSuccess = 903,
    ErrSaslFail = 904,
    RplSaslMechs = 908,
}

impl NumericReply {
    /// Get the numeric code as a string
    pub fn code(&self) -> String {
        format!("{:03}", *self as u16)
    }

    /// Create a numeric reply message
    pub fn reply(&self, target: &str, params: Vec<String>) -> Message {
        let mut all_params = vec![target.to_string()];
        all_params.extend(params);

        Message::new(crate::MessageType::Custom(self.code()), all_params)
    }
}

/// Common numeric replies
impl NumericReply {
    /// ERR_NOSUCHNICK
    pub fn no_such_nick(target: &str, nick: &str) -> Message {
        Self::ErrNoSuchNick.reply(
            target,
            vec![nick.to_string(), "No such nick/channel".to_string()],
        )
    }

    /// ERR_USERNOTINCHANNEL
    pub fn user_not_in_channel(target: &str, nick: &str, channel: &str) -> Message {
        Self::ErrUserNotInChannel.reply(
            target,
            vec![
                nick.to_string(),
                channel.to_string(),
                "They aren't on that channel".to_string(),
            ],
        )
    }

    /// ERR_CHANOPRIVSNEEDED
    pub fn chanop_privs_needed(target: &str, channel: &str) -> Message {
        Self::ErrChanOpPrivsNeeded.reply(
            target,
            vec![
                channel.to_string(),
                "You're not a channel operator".to_string(),
            ],
        )
    }

    /// ERR_NEEDMOREPARAMS
    pub fn need_more_params(target: &str, command: &str) -> Message {
        Self::ErrNeedMoreParams.reply(
            target,
            vec![command.to_string(), "Not enough parameters".to_string()],
        )
    }

    /// RPL_LOGGEDIN
    pub fn logged_in(target: &str, mask: &str, account: &str) -> Message {
        Self::RplLoggedIn.reply(
            target,
            vec![
                mask.to_string(),
                account.to_string(),
                format!("You are now logged in as {}", account),
            ],
        )
    }

    /// RPL_LOGGEDOUT
    pub fn logged_out(target: &str, mask: &str) -> Message {
        Self::RplLoggedOut.reply(
            target,
            vec![mask.to_string(), "You are now logged out".to_string()],
        )
    }

    /// RPL_SASLSUCCESS
    pub fn sasl_success(target: &str) -> Message {
        Self::RplSaslSuccess.reply(
            target,
            vec!["SASL authentication successful".to_string()],
        )
    }

    /// ERR_SASLFAIL
    pub fn sasl_fail(target: &str) -> Message {
        Self::ErrSaslFail.reply(target, vec!["SASL authentication failed".to_string()])
    }

    /// RPL_SASLMECHS
    pub fn sasl_mechs(target: &str, mechanisms: &str) -> Message {
        Self::RplSaslMechs.reply(
            target,
            vec![
                mechanisms.to_string(),
                "are available SASL mechanisms".to_string(),
            ],
        )
    }
}

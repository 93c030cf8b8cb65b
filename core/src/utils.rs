//! Utility functions and helpers

/// UID allocation
pub mod uid {
    /// Allocates TS6-style UIDs: the server's SID followed by six
    /// characters counting through A..Z then 0..9.
    #[derive(Debug)]
    pub struct UidGenerator {
        sid: String,
        counter: u64,
    }

    impl UidGenerator {
        pub fn new(sid: &str) -> Self {
            Self {
                sid: sid.to_string(),
                counter: 0,
            }
        }

        /// Produce the next UID
        pub fn next_uid(&mut self) -> String {
            const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
            let mut suffix = [b'A'; 6];
            let mut n = self.counter;
            self.counter += 1;
            for slot in suffix.iter_mut().rev() {
                *slot = ALPHABET[(n % 36) as usize];
                n /= 36;
            }
            format!("{}{}", self.sid, std::str::from_utf8(&suffix).unwrap_or("AAAAAA"))
        }
    }
}

/// String validation utilities
pub mod string {
    /// Check if a string is a valid IRC channel name
    pub fn is_valid_channel_name(name: &str) -> bool {
        if name.is_empty() {
            return false;
        }

        let first_char = match name.chars().next() {
            Some(c) => c,
            None => return false,
        };
        if !"#&+!".contains(first_char) {
            return false;
        }

        // Channel name should not contain spaces or control characters
        name.chars()
            .all(|c| c.is_ascii() && !c.is_control() && c != ' ' && c != ',' && c != ':')
    }

    /// Check if a string is a valid IRC nickname
    pub fn is_valid_nickname(nick: &str, max_length: usize) -> bool {
        if nick.is_empty() || nick.len() > max_length {
            return false;
        }

        let chars: Vec<char> = nick.chars().collect();

        let first_char = chars[0];
        if !first_char.is_ascii_alphabetic() && !"[]\\`_^{|}~".contains(first_char) {
            return false;
        }

        for &c in &chars[1..] {
            if !c.is_ascii_alphanumeric() && !"-[]\\`_^{|}~".contains(c) {
                return false;
            }
        }

        true
    }
}

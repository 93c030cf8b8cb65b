//! Channel mode taxonomy
//!
//! Classifies channel modes into six types, carries the letter/name tables
//! each server advertises, and converts between mode strings and change
//! lists. Status modes have two serialized perspectives: nicknames toward
//! clients and UIDs toward servers.

use std::collections::HashMap;

/// The six channel mode types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelModeType {
    /// Never parameterized (e.g. +m)
    Normal,
    /// Parameter required when setting and unsetting
    Parameter,
    /// Parameter required when setting, absent when unsetting (e.g. +l)
    ParameterSet,
    /// Carries a list of values with metadata; unset by value (e.g. +b)
    List,
    /// Like list, but values are users and govern privilege
    Status,
    /// Parameter mandatory when setting; consumed on unset only if present
    Key,
}

impl ChannelModeType {
    /// Numeric type used on the wire and in mode tables
    pub fn number(&self) -> u8 {
        match self {
            ChannelModeType::Normal => 0,
            ChannelModeType::Parameter => 1,
            ChannelModeType::ParameterSet => 2,
            ChannelModeType::List => 3,
            ChannelModeType::Status => 4,
            ChannelModeType::Key => 5,
        }
    }
}

/// Whether a mode consumes a parameter in a given state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamNeed {
    /// Parameter must be present; the mode is skipped without one
    Mandatory,
    /// Parameter is consumed if present
    Optional,
    /// No parameter
    No,
}

/// One rung of the status prefix ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPrefix {
    /// Privilege level; higher outranks lower
    pub level: i32,
    /// Mode letter
    pub letter: char,
    /// Nick-list prefix symbol
    pub symbol: char,
    /// Mode name
    pub name: &'static str,
}

/// The prefix ladder, in descending order of authority
pub const STATUS_PREFIXES: [StatusPrefix; 5] = [
    StatusPrefix { level: 3, letter: 'q', symbol: '~', name: "owner" },
    StatusPrefix { level: 2, letter: 'a', symbol: '&', name: "admin" },
    StatusPrefix { level: 1, letter: 'o', symbol: '@', name: "op" },
    StatusPrefix { level: 0, letter: 'h', symbol: '%', name: "halfop" },
    StatusPrefix { level: -1, letter: 'v', symbol: '+', name: "voice" },
];

/// Lowest level that counts as basic status (halfop equivalent)
pub const LEVEL_BASIC: i32 = 0;

/// Level of a member holding no status at all
pub const LEVEL_NONE: i32 = -2;

/// Look up a ladder rung by mode name
pub fn status_by_name(name: &str) -> Option<&'static StatusPrefix> {
    STATUS_PREFIXES.iter().find(|p| p.name == name)
}

/// Look up a ladder rung by level
pub fn status_by_level(level: i32) -> Option<&'static StatusPrefix> {
    STATUS_PREFIXES.iter().find(|p| p.level == level)
}

/// Render prefix symbols for a descending level list. With `multi` all
/// symbols appear (the multi-prefix capability); otherwise only the
/// highest.
pub fn prefix_symbols(levels: &[i32], multi: bool) -> String {
    let mut out = String::new();
    for level in levels {
        if let Some(p) = status_by_level(*level) {
            out.push(p.symbol);
            if !multi {
                break;
            }
        }
    }
    out
}

/// A single mode definition in a server's table
#[derive(Debug, Clone)]
pub struct ModeDef {
    /// Mode name
    pub name: String,
    /// Mode letter
    pub letter: char,
    /// Mode type
    pub mode_type: ChannelModeType,
}

/// One proposed or applied mode change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    /// true to set, false to unset
    pub state: bool,
    /// Mode name
    pub name: String,
    /// Parameter, if the mode takes one in this state
    pub param: Option<String>,
}

impl ModeChange {
    pub fn new(state: bool, name: &str, param: Option<String>) -> Self {
        Self {
            state,
            name: name.to_string(),
            param,
        }
    }
}

/// Options for mode string serialization
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeStringOpts {
    /// Server perspective: status parameters stay UIDs
    pub over_protocol: bool,
    /// Split into multiple strings of at most MODES_PER_LINE changes
    pub split: bool,
    /// Alphabetize, positive changes first
    pub organize: bool,
    /// Render changes without consulting parameter discipline
    pub skip_checks: bool,
}

/// Maximum mode changes carried on one MODE line
pub const MODES_PER_LINE: usize = 4;

/// The channel mode table a server advertises: name and letter mappings
/// plus type classification.
#[derive(Debug, Clone)]
pub struct ModeTable {
    by_name: HashMap<String, ModeDef>,
    by_letter: HashMap<char, String>,
}

impl ModeTable {
    /// An empty table
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            by_letter: HashMap::new(),
        }
    }

    /// The standard mode set
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        for (name, letter, mode_type) in [
            ("moderated", 'm', ChannelModeType::Normal),
            ("invite_only", 'i', ChannelModeType::Normal),
            ("no_ext", 'n', ChannelModeType::Normal),
            ("protect_topic", 't', ChannelModeType::Normal),
            ("secret", 's', ChannelModeType::Normal),
            ("private", 'p', ChannelModeType::Normal),
            ("limit", 'l', ChannelModeType::ParameterSet),
            ("key", 'k', ChannelModeType::Key),
            ("ban", 'b', ChannelModeType::List),
            ("except", 'e', ChannelModeType::List),
            ("owner", 'q', ChannelModeType::Status),
            ("admin", 'a', ChannelModeType::Status),
            ("op", 'o', ChannelModeType::Status),
            ("halfop", 'h', ChannelModeType::Status),
            ("voice", 'v', ChannelModeType::Status),
        ] {
            table.insert(name, letter, mode_type);
        }
        table
    }

    /// Register a mode
    pub fn insert(&mut self, name: &str, letter: char, mode_type: ChannelModeType) {
        self.by_name.insert(
            name.to_string(),
            ModeDef {
                name: name.to_string(),
                letter,
                mode_type,
            },
        );
        self.by_letter.insert(letter, name.to_string());
    }

    /// Type of a mode by name
    pub fn cmode_type(&self, name: &str) -> Option<ChannelModeType> {
        self.by_name.get(name).map(|d| d.mode_type)
    }

    /// Letter of a mode by name
    pub fn cmode_letter(&self, name: &str) -> Option<char> {
        self.by_name.get(name).map(|d| d.letter)
    }

    /// Name of a mode by letter
    pub fn cmode_name(&self, letter: char) -> Option<&str> {
        self.by_letter.get(&letter).map(|s| s.as_str())
    }

    /// All modes of a given type, sorted by letter
    pub fn modes_of_type(&self, mode_type: ChannelModeType) -> Vec<&ModeDef> {
        let mut defs: Vec<&ModeDef> = self
            .by_name
            .values()
            .filter(|d| d.mode_type == mode_type)
            .collect();
        defs.sort_by_key(|d| d.letter);
        defs
    }

    /// Parameter discipline of a mode in a given state
    pub fn cmode_takes_parameter(&self, name: &str, state: bool) -> Option<ParamNeed> {
        let mode_type = self.cmode_type(name)?;
        Some(match mode_type {
            ChannelModeType::Normal => ParamNeed::No,
            ChannelModeType::Parameter => ParamNeed::Mandatory,
            ChannelModeType::ParameterSet => {
                if state {
                    ParamNeed::Mandatory
                } else {
                    ParamNeed::No
                }
            }
            // List modes without a parameter are a view request
            ChannelModeType::List => ParamNeed::Optional,
            ChannelModeType::Status => ParamNeed::Mandatory,
            ChannelModeType::Key => {
                if state {
                    ParamNeed::Mandatory
                } else {
                    ParamNeed::Optional
                }
            }
        })
    }

    /// Parse a mode string ("+mnt-l" followed by parameters) into a change
    /// list. Unknown letters and modes missing a mandatory parameter are
    /// skipped. `over_protocol` records the caller's perspective: status
    /// parameters are UIDs over a server link and nicknames otherwise; the
    /// parameters pass through either way.
    pub fn cmodes_from_string(&self, input: &str, over_protocol: bool) -> Vec<ModeChange> {
        let _ = over_protocol;
        let mut words = input.split_whitespace();
        let letters = match words.next() {
            Some(l) => l,
            None => return Vec::new(),
        };
        let mut params = words.map(|s| s.to_string()).collect::<Vec<_>>().into_iter();

        let mut state = true;
        let mut changes = Vec::new();
        for letter in letters.chars() {
            match letter {
                '+' => {
                    state = true;
                    continue;
                }
                '-' => {
                    state = false;
                    continue;
                }
                _ => {}
            }

            let name = match self.cmode_name(letter) {
                Some(name) => name.to_string(),
                None => {
                    tracing::debug!("Skipping unknown mode letter {}", letter);
                    continue;
                }
            };

            let param = match self.cmode_takes_parameter(&name, state) {
                Some(ParamNeed::Mandatory) => match params.next() {
                    Some(p) => Some(p),
                    None => {
                        tracing::debug!("Skipping mode {} with missing parameter", name);
                        continue;
                    }
                },
                Some(ParamNeed::Optional) => params.next(),
                _ => None,
            };

            changes.push(ModeChange {
                state,
                name,
                param,
            });
        }
        changes
    }

    /// Render a change list as one or more mode strings. `resolve_nick`
    /// maps UIDs to nicknames for the client perspective of status modes.
    pub fn strings_from_cmodes(
        &self,
        changes: &[ModeChange],
        opts: ModeStringOpts,
        resolve_nick: &dyn Fn(&str) -> Option<String>,
    ) -> Vec<String> {
        let mut changes: Vec<&ModeChange> = changes
            .iter()
            .filter(|change| {
                let Some(def) = self.by_name.get(&change.name) else {
                    tracing::debug!("Dropping unknown mode {} from string", change.name);
                    return false;
                };
                if opts.skip_checks {
                    return true;
                }
                match self.cmode_takes_parameter(&def.name, change.state) {
                    Some(ParamNeed::Mandatory) => change.param.is_some(),
                    _ => true,
                }
            })
            .collect();

        if opts.organize {
            changes.sort_by_key(|c| {
                let letter = self.cmode_letter(&c.name).unwrap_or('\0');
                (!c.state, letter)
            });
        }

        let per_line = if opts.split {
            MODES_PER_LINE
        } else {
            usize::MAX
        };

        let mut out = Vec::new();
        for chunk in chunked(&changes, per_line) {
            let mut letters = String::new();
            let mut params = Vec::new();
            let mut sign: Option<bool> = None;

            for change in chunk {
                if sign != Some(change.state) {
                    letters.push(if change.state { '+' } else { '-' });
                    sign = Some(change.state);
                }
                letters.push(self.cmode_letter(&change.name).unwrap_or('?'));

                if let Some(param) = &change.param {
                    let is_status =
                        self.cmode_type(&change.name) == Some(ChannelModeType::Status);
                    if is_status && !opts.over_protocol {
                        params.push(resolve_nick(param).unwrap_or_else(|| param.clone()));
                    } else {
                        params.push(param.clone());
                    }
                }
            }

            if letters.is_empty() {
                continue;
            }
            let mut line = letters;
            for param in params {
                line.push(' ');
                line.push_str(&param);
            }
            out.push(line);
        }

        if out.is_empty() {
            out.push("+".to_string());
        }
        out
    }
}

impl Default for ModeTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn chunked<'a, T>(items: &'a [T], size: usize) -> impl Iterator<Item = &'a [T]> {
    let size = size.max(1).min(items.len().max(1));
    items.chunks(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_resolve(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_taxonomy_numbers() {
        let table = ModeTable::with_defaults();
        assert_eq!(table.cmode_type("moderated"), Some(ChannelModeType::Normal));
        assert_eq!(table.cmode_type("limit"), Some(ChannelModeType::ParameterSet));
        assert_eq!(table.cmode_type("ban"), Some(ChannelModeType::List));
        assert_eq!(table.cmode_type("op"), Some(ChannelModeType::Status));
        assert_eq!(table.cmode_type("key"), Some(ChannelModeType::Key));
        assert_eq!(ChannelModeType::Key.number(), 5);
        assert_eq!(table.cmode_type("nosuch"), None);
    }

    #[test]
    fn test_parameter_discipline() {
        let table = ModeTable::with_defaults();
        assert_eq!(
            table.cmode_takes_parameter("limit", true),
            Some(ParamNeed::Mandatory)
        );
        assert_eq!(table.cmode_takes_parameter("limit", false), Some(ParamNeed::No));
        assert_eq!(
            table.cmode_takes_parameter("key", false),
            Some(ParamNeed::Optional)
        );
        assert_eq!(
            table.cmode_takes_parameter("ban", true),
            Some(ParamNeed::Optional)
        );
        assert_eq!(
            table.cmode_takes_parameter("op", false),
            Some(ParamNeed::Mandatory)
        );
    }

    #[test]
    fn test_ladder_order() {
        let mut last = i32::MAX;
        for prefix in STATUS_PREFIXES {
            assert!(prefix.level < last);
            last = prefix.level;
        }
        assert_eq!(status_by_name("halfop").unwrap().level, LEVEL_BASIC);
        assert_eq!(prefix_symbols(&[3, 1, -1], true), "~@+");
        assert_eq!(prefix_symbols(&[3, 1, -1], false), "~");
    }

    #[test]
    fn test_cmodes_from_string() {
        let table = ModeTable::with_defaults();
        let changes = table.cmodes_from_string("+mntl 25", false);
        assert_eq!(
            changes,
            vec![
                ModeChange::new(true, "moderated", None),
                ModeChange::new(true, "no_ext", None),
                ModeChange::new(true, "protect_topic", None),
                ModeChange::new(true, "limit", Some("25".to_string())),
            ]
        );

        // unset +l consumes no parameter
        let changes = table.cmodes_from_string("-l", false);
        assert_eq!(changes, vec![ModeChange::new(false, "limit", None)]);

        // unknown letters and op-without-parameter are skipped
        let changes = table.cmodes_from_string("+Xo", false);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_strings_round_trip() {
        let table = ModeTable::with_defaults();
        let changes = table.cmodes_from_string("+ml-t 5", false);
        let out = table.strings_from_cmodes(&changes, ModeStringOpts::default(), &no_resolve);
        assert_eq!(out, vec!["+ml-t 5"]);

        let back = table.cmodes_from_string(&out[0], false);
        assert_eq!(back, changes);
    }

    #[test]
    fn test_strings_organize() {
        let table = ModeTable::with_defaults();
        let changes = vec![
            ModeChange::new(false, "protect_topic", None),
            ModeChange::new(true, "no_ext", None),
            ModeChange::new(true, "moderated", None),
        ];
        let opts = ModeStringOpts {
            organize: true,
            ..Default::default()
        };
        let out = table.strings_from_cmodes(&changes, opts, &no_resolve);
        assert_eq!(out, vec!["+mn-t"]);
    }

    #[test]
    fn test_strings_split() {
        let table = ModeTable::with_defaults();
        let changes: Vec<ModeChange> = ["moderated", "no_ext", "protect_topic", "secret", "private"]
            .iter()
            .map(|n| ModeChange::new(true, n, None))
            .collect();
        let opts = ModeStringOpts {
            split: true,
            ..Default::default()
        };
        let out = table.strings_from_cmodes(&changes, opts, &no_resolve);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], "+mnts");
        assert_eq!(out[1], "+p");
    }

    #[test]
    fn test_status_perspective() {
        let table = ModeTable::with_defaults();
        let changes = vec![ModeChange::new(true, "op", Some("0AAAAAAAB".to_string()))];

        let server_view = table.strings_from_cmodes(
            &changes,
            ModeStringOpts {
                over_protocol: true,
                ..Default::default()
            },
            &no_resolve,
        );
        assert_eq!(server_view, vec!["+o 0AAAAAAAB"]);

        let client_view = table.strings_from_cmodes(&changes, ModeStringOpts::default(), &|uid| {
            (uid == "0AAAAAAAB").then(|| "alice".to_string())
        });
        assert_eq!(client_view, vec!["+o alice"]);
    }
}

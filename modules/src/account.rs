//! Account registration and login
//!
//! Accounts persist in a single SQLite table, accessed with parameterized
//! statements; this module is the only writer. Logging in binds a
//! sanitized row to the user and applies the registered user mode, which
//! is monotone: the mode can be shed but never set directly.

use oxircd_core::{AccountRef, Database, Error, NumericReply, Result, User};
use rusqlite::{params, Connection};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::sync::Mutex;

/// One row of the accounts table. Password is the encoded form under the
/// row's algorithm tag; the tag-without-salt scheme is kept for
/// compatibility with existing tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRow {
    pub id: i64,
    pub name: String,
    pub password: String,
    pub encrypt: String,
    pub created: i64,
    pub cserver: String,
    pub csid: String,
    pub updated: i64,
    pub userver: String,
    pub usid: String,
}

/// Handle on the accounts table
pub struct AccountStore {
    conn: Mutex<Connection>,
}

impl AccountStore {
    /// Open (and initialize) the accounts database at a path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store, for tests and ephemeral setups
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                id INT,
                name VARCHAR COLLATE NOCASE,
                password VARCHAR,
                encrypt VARCHAR,
                created UINT,
                cserver VARCHAR,
                csid INT,
                updated UINT,
                userver VARCHAR,
                usid INT
            )",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Account("Accounts store lock poisoned".to_string()))
    }

    /// Look up an account by name, case-insensitively
    pub fn lookup(&self, name: &str) -> Result<Option<AccountRow>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(
            "SELECT id, name, password, encrypt, created, cserver, csid,
                    updated, userver, usid
             FROM accounts WHERE name = ?1",
        )?;
        let mut rows = statement.query_map(params![name], |row| {
            Ok(AccountRow {
                id: row.get(0)?,
                name: row.get(1)?,
                password: row.get(2)?,
                encrypt: row.get(3)?,
                created: row.get(4)?,
                cserver: row.get(5)?,
                csid: row.get(6)?,
                updated: row.get(7)?,
                userver: row.get(8)?,
                usid: row.get(9)?,
            })
        })?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Next account id: ids are assigned monotonically as max(id)+1
    pub fn next_id(&self) -> Result<i64> {
        let conn = self.lock()?;
        let id: i64 =
            conn.query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM accounts", [], |row| {
                row.get(0)
            })?;
        Ok(id)
    }

    /// Insert a new account row
    pub fn insert(&self, row: &AccountRow) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO accounts
                (id, name, password, encrypt, created, cserver, csid,
                 updated, userver, usid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                row.id,
                row.name,
                row.password,
                row.encrypt,
                row.created,
                row.cserver,
                row.csid,
                row.updated,
                row.userver,
                row.usid
            ],
        )?;
        Ok(())
    }

    /// Number of accounts
    pub fn count(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Encode a password under an algorithm tag
pub fn encode_password(password: &str, algorithm: &str) -> Result<String> {
    match algorithm {
        "sha1" => {
            let mut hasher = Sha1::new();
            hasher.update(password.as_bytes());
            Ok(format!("{:x}", hasher.finalize()))
        }
        "sha256" => {
            let mut hasher = Sha256::new();
            hasher.update(password.as_bytes());
            Ok(format!("{:x}", hasher.finalize()))
        }
        "sha512" => {
            let mut hasher = Sha512::new();
            hasher.update(password.as_bytes());
            Ok(format!("{:x}", hasher.finalize()))
        }
        other => Err(Error::Account(format!(
            "Unknown encryption algorithm {:?}",
            other
        ))),
    }
}

/// Compare two encoded passwords without early exit
fn fixed_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Resolve account mask tokens: `$r` matches any registered user,
/// `$r:NAME` matches a specific account. Returns None for other masks.
pub fn account_matches(user: &User, mask: &str) -> Option<bool> {
    if mask == "$r" {
        return Some(user.account.is_some());
    }
    if let Some(name) = mask.strip_prefix("$r:") {
        return Some(
            user.account
                .as_ref()
                .map(|a| a.name.eq_ignore_ascii_case(name))
                .unwrap_or(false),
        );
    }
    None
}

/// The account pipeline
pub struct AccountModule {
    store: AccountStore,
    encryption: String,
    me_name: String,
    me_sid: String,
}

impl AccountModule {
    /// Create the module for the local server
    pub fn new(store: AccountStore, encryption: &str, me_name: &str, me_sid: &str) -> Self {
        Self {
            store,
            encryption: encryption.to_string(),
            me_name: me_name.to_string(),
            me_sid: me_sid.to_string(),
        }
    }

    /// Access to the store, for bursts and inspection
    pub fn store(&self) -> &AccountStore {
        &self.store
    }

    /// Create an account. Fails if the name is taken (case-insensitively).
    pub fn register_account(
        &self,
        name: &str,
        password: &str,
        user: Option<&User>,
    ) -> Result<AccountRow> {
        if self.store.lookup(name)?.is_some() {
            return Err(Error::Account(format!("Account {} already exists", name)));
        }

        let now = chrono::Utc::now().timestamp();
        let row = AccountRow {
            id: self.store.next_id()?,
            name: name.to_string(),
            password: encode_password(password, &self.encryption)?,
            encrypt: self.encryption.clone(),
            created: now,
            cserver: self.me_name.clone(),
            csid: self.me_sid.clone(),
            updated: now,
            userver: self.me_name.clone(),
            usid: self.me_sid.clone(),
        };
        self.store.insert(&row)?;

        if let Some(user) = user {
            tracing::info!(
                target: "snotice",
                "account_register: {} registered account {}",
                user.nick,
                row.name
            );
        }
        Ok(row)
    }

    /// Log a user into an account. With a password, the credential is
    /// checked under the row's algorithm; without one the caller has
    /// already authenticated (services, SASL).
    pub fn login_account(
        &self,
        pool: &Database,
        name: &str,
        uid: &str,
        password: Option<&str>,
        just_registered: bool,
    ) -> Result<bool> {
        let Some(mut user) = pool.lookup_user(uid) else {
            return Ok(false);
        };

        let Some(row) = self.store.lookup(name)? else {
            if user.is_local() {
                user.server_notice("No such account")?;
            }
            return Ok(false);
        };

        if let Some(password) = password {
            let encoded = encode_password(password, &row.encrypt)?;
            if !fixed_time_eq(&encoded, &row.password) {
                if user.is_local() {
                    user.server_notice("Password incorrect")?;
                }
                return Ok(false);
            }
        }

        user.account = Some(AccountRef {
            id: row.id,
            name: row.name.clone(),
        });
        user.add_mode_internal('r');
        let mask = user.full_mask();
        if user.is_local() {
            user.send_numeric_message(NumericReply::logged_in(&user.nick, &mask, &row.name))?;
        }
        pool.update_user(user.clone())?;

        user.fire_event("logged_in", vec![row.name.clone()]);
        if !just_registered {
            tracing::info!(
                target: "snotice",
                "account_login: {} logged into {}",
                user.nick,
                row.name
            );
        }
        Ok(true)
    }

    /// Log a user out. From the mode-unset path the mode is already on
    /// its way out and is left alone.
    pub fn logout_account(&self, pool: &Database, uid: &str, in_mode_unset: bool) -> Result<bool> {
        let Some(mut user) = pool.lookup_user(uid) else {
            return Ok(false);
        };
        let Some(account) = user.account.take() else {
            return Ok(false);
        };

        if !in_mode_unset {
            user.remove_mode_internal('r');
        }
        let mask = user.full_mask();
        if user.is_local() {
            user.send_numeric_message(NumericReply::logged_out(&user.nick, &mask))?;
        }
        pool.update_user(user.clone())?;

        tracing::info!(
            target: "snotice",
            "account_logout: {} logged out of {}",
            user.nick,
            account.name
        );
        Ok(true)
    }

    /// REGISTER command: create the account, then log straight in
    pub fn handle_register_command(
        &self,
        pool: &Database,
        uid: &str,
        name: &str,
        password: &str,
    ) -> Result<()> {
        let Some(user) = pool.lookup_user(uid) else {
            return Ok(());
        };

        match self.register_account(name, password, Some(&user)) {
            Ok(_) => {
                user.server_notice("Registration successful")?;
                self.login_account(pool, name, uid, Some(password), true)?;
            }
            Err(Error::Account(reason)) => {
                user.server_notice(&reason)?;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// The registered user-mode handler. Setting is forbidden; unsetting
    /// routes through logout.
    pub fn handle_registered_umode(&self, pool: &Database, uid: &str, state: bool) -> bool {
        if state {
            return false;
        }
        if let Err(e) = self.logout_account(pool, uid, true) {
            tracing::warn!("Logout via mode unset failed: {}", e);
        }
        true
    }

    /// Describe accounts to a newly linked server. The burst format is
    /// not pinned down yet; the hook stays, the wire stays silent.
    pub fn send_burst(&self, server: &str) -> Result<()> {
        tracing::debug!("Account burst to {} skipped (no format)", server);
        Ok(())
    }
}

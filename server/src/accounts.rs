//! Persistent player accounts: credentials, bios, and the friend graph.
//!
//! Accounts live in a flat text file, one escaped pipe-delimited record per
//! line (`name|secret|bio|friend-id-list`). Every mutating operation rewrites
//! the whole file synchronously before returning; a failed write is surfaced
//! to the caller while the in-memory change stays applied, so durability is
//! best-effort rather than transactional.
//!
//! Secrets are stored and compared verbatim. That mirrors the observable
//! protocol behavior this server is required to keep; a hardened deployment
//! would swap in salted hashing at the login seam.

use log::{info, warn};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One persistent account record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub secret: String,
    pub bio: String,
    pub friends: BTreeSet<String>,
}

/// Owned collection of all accounts plus their backing file.
pub struct AccountStore {
    path: PathBuf,
    accounts: HashMap<String, Account>,
}

impl AccountStore {
    /// Opens the store at `path`, loading any existing records. A missing
    /// file is an empty store, not an error.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let accounts = match fs::read_to_string(&path) {
            Ok(contents) => parse_store(&contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e),
        };

        if !accounts.is_empty() {
            info!("Loaded {} accounts from {}", accounts.len(), path.display());
        }

        Ok(Self { path, accounts })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&Account> {
        self.accounts.get(name)
    }

    /// Registers a new account. Fails without touching the store if the name
    /// is already taken, so a rejected registration leaves nothing behind.
    pub fn create(&mut self, name: &str, secret: &str, bio: &str) -> io::Result<()> {
        if self.accounts.contains_key(name) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("account '{}' already exists", name),
            ));
        }

        self.accounts.insert(
            name.to_string(),
            Account {
                name: name.to_string(),
                secret: secret.to_string(),
                bio: bio.to_string(),
                friends: BTreeSet::new(),
            },
        );
        info!("Registered account '{}'", name);
        self.save()
    }

    /// Replaces an account's bio.
    pub fn set_bio(&mut self, name: &str, bio: &str) -> io::Result<()> {
        let account = self.account_mut(name)?;
        account.bio = bio.to_string();
        self.save()
    }

    /// Adds the symmetric friend edge between `a` and `b`. Idempotent; both
    /// accounts must exist, and nothing is changed when either is missing.
    pub fn add_friend_edge(&mut self, a: &str, b: &str) -> io::Result<()> {
        self.account_mut(a)?;
        self.account_mut(b)?;

        let mut added = false;
        if let Some(acc) = self.accounts.get_mut(a) {
            added = acc.friends.insert(b.to_string());
        }
        if let Some(acc) = self.accounts.get_mut(b) {
            acc.friends.insert(a.to_string());
        }

        if added {
            info!("Friend edge added: '{}' <-> '{}'", a, b);
        }
        self.save()
    }

    /// Removes the symmetric friend edge between `a` and `b`. Idempotent.
    pub fn remove_friend_edge(&mut self, a: &str, b: &str) -> io::Result<()> {
        self.account_mut(a)?;
        self.account_mut(b)?;

        if let Some(acc) = self.accounts.get_mut(a) {
            acc.friends.remove(b);
        }
        if let Some(acc) = self.accounts.get_mut(b) {
            acc.friends.remove(a);
        }
        self.save()
    }

    pub fn has_friend_edge(&self, a: &str, b: &str) -> bool {
        self.accounts
            .get(a)
            .map(|acc| acc.friends.contains(b))
            .unwrap_or(false)
    }

    fn account_mut(&mut self, name: &str) -> io::Result<&mut Account> {
        self.accounts.get_mut(name).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no account named '{}'", name),
            )
        })
    }

    /// Rewrites the whole backing file from the in-memory state.
    fn save(&self) -> io::Result<()> {
        let mut names: Vec<&String> = self.accounts.keys().collect();
        names.sort();

        let mut contents = String::new();
        for name in names {
            let account = &self.accounts[name];
            let friends: Vec<&str> = account.friends.iter().map(String::as_str).collect();
            contents.push_str(&format!(
                "{}|{}|{}|{}\n",
                escape_field(&account.name),
                escape_field(&account.secret),
                escape_field(&account.bio),
                escape_field(&friends.join(","))
            ));
        }

        fs::write(&self.path, contents)
    }
}

fn parse_store(contents: &str) -> HashMap<String, Account> {
    let mut accounts = HashMap::new();
    for line in contents.lines() {
        if line.is_empty() {
            continue;
        }
        match parse_record(line) {
            Some(account) => {
                accounts.insert(account.name.clone(), account);
            }
            None => warn!("Skipping malformed account record: {}", line),
        }
    }
    accounts
}

fn parse_record(line: &str) -> Option<Account> {
    let fields = split_record(line);
    if fields.len() != 4 || fields[0].is_empty() {
        return None;
    }

    let friends = fields[3]
        .split(',')
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();

    Some(Account {
        name: fields[0].clone(),
        secret: fields[1].clone(),
        bio: fields[2].clone(),
        friends,
    })
}

/// Escapes the record delimiter, the escape character, and newlines so a
/// record always stays on one line.
fn escape_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '|' => out.push_str("\\|"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Splits one stored line into unescaped fields.
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => field.push('\n'),
                Some(other) => field.push(other),
                None => {}
            },
            '|' => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

//! Authentication seam.
//!
//! The login handler asks the authenticator whether a name/password pair is
//! acceptable; everything about where credentials live is behind the trait.

use crate::store::{Filter, Record, RecordKind, Store, UserId, UserRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Login accepted for this user id.
    Accepted(UserId),
    /// Explicit rejection; the text goes back to the client and the
    /// connection stays open.
    Rejected(String),
}

pub trait Authenticator: Send + Sync {
    fn login(&self, store: &dyn Store, name: &str, password: &str) -> LoginOutcome;
}

/// Checks credentials against the user table, optionally creating the
/// account on first login.
pub struct StoreAuthenticator {
    auto_register: bool,
}

impl StoreAuthenticator {
    pub fn new(auto_register: bool) -> Self {
        Self { auto_register }
    }
}

impl Authenticator for StoreAuthenticator {
    fn login(&self, store: &dyn Store, name: &str, password: &str) -> LoginOutcome {
        if name.is_empty() {
            return LoginOutcome::Rejected("empty user name".into());
        }
        match store.find(RecordKind::User, &Filter::Name(name.to_string())) {
            Some(Record::User(user)) => {
                if user.password == password {
                    LoginOutcome::Accepted(user.id)
                } else {
                    LoginOutcome::Rejected("wrong password".into())
                }
            }
            Some(_) => LoginOutcome::Rejected("login failed".into()),
            None if self.auto_register => {
                let id = store.upsert(Record::User(UserRecord {
                    id: 0,
                    name: name.to_string(),
                    password: password.to_string(),
                    plays: 0,
                }));
                LoginOutcome::Accepted(id)
            }
            None => LoginOutcome::Rejected("unknown user".into()),
        }
    }
}

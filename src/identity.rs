use serde::{ Deserialize, Serialize };
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

impl CurrentUser {
    pub fn greeting_name(&self) -> Option<&str> {
        self.display_name.as_deref().or(self.email.as_deref())
    }
}

/// Source of the signed-in user. Sessions never depend on it.
pub trait IdentityProvider: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<Option<CurrentUser>>;
}

/// Identity fixed at startup from command-line options.
pub struct StaticIdentity {
    tx: watch::Sender<Option<CurrentUser>>,
}

impl StaticIdentity {
    pub fn new(user: Option<CurrentUser>) -> Self {
        let (tx, _) = watch::channel(user);
        Self { tx }
    }

    pub fn from_parts(display_name: Option<String>, email: Option<String>) -> Self {
        let user = if display_name.is_none() && email.is_none() {
            None
        } else {
            Some(CurrentUser { display_name, email, photo_url: None })
        };
        Self::new(user)
    }
}

impl IdentityProvider for StaticIdentity {
    fn subscribe(&self) -> watch::Receiver<Option<CurrentUser>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_falls_back_to_email() {
        let anonymous = StaticIdentity::from_parts(None, None);
        assert!(anonymous.subscribe().borrow().is_none());

        let identity = StaticIdentity::from_parts(None, Some("a@b.c".into()));
        let rx = identity.subscribe();
        assert_eq!(rx.borrow().as_ref().and_then(|u| u.greeting_name()), Some("a@b.c"));

        let named = StaticIdentity::from_parts(Some("Noor".into()), Some("a@b.c".into()));
        assert_eq!(named.subscribe().borrow().as_ref().and_then(|u| u.greeting_name()), Some("Noor"));
    }
}

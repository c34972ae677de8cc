use crate::admin::Drafts;
use crate::database::SlotStore;
use crate::error::SiteError;
use crate::model::CurrentUser;
use crate::notification::Notifier;
use log::{debug, warn};
use serde::Serialize;

const CURRENT_USER: &str = "currentUser";

/// Which session-dependent controls a page shows.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility {
    pub login: bool,
    pub register: bool,
    pub logout: bool,
    pub admin: bool,
}

impl Visibility {
    pub fn for_user(user: Option<&CurrentUser>) -> Self {
        let signed_in = user.is_some();
        Visibility {
            login: !signed_in,
            register: !signed_in,
            logout: signed_in,
            admin: user.map_or(false, CurrentUser::is_admin),
        }
    }
}

/// The single signed-in identity of one browser.
pub struct SessionStore<S> {
    slots: S,
}

impl<S: SlotStore> SessionStore<S> {
    pub fn new(slots: S) -> Self {
        SessionStore { slots }
    }

    /// An unreadable session counts as signed out.
    pub fn current_user(&self) -> Option<CurrentUser> {
        self.slots.read_slot(CURRENT_USER).unwrap_or_else(|err| {
            warn!("Ignoring unreadable session: {}", err);
            None
        })
    }

    /// Returns the visibility the page has to switch to.
    pub fn set_current_user(&self, user: &CurrentUser) -> Result<Visibility, SiteError> {
        self.slots.write_slot(CURRENT_USER, user)?;
        debug!("Session set to user {}", user.id);
        Ok(Visibility::for_user(Some(user)))
    }

    pub fn clear_current_user(&self) -> Result<Visibility, SiteError> {
        self.slots.remove_slot(CURRENT_USER)?;
        debug!("Session cleared");
        Ok(Visibility::for_user(None))
    }

    pub fn is_admin(&self) -> bool {
        self.current_user().map_or(false, |user| user.is_admin())
    }

    pub fn visibility(&self) -> Visibility {
        Visibility::for_user(self.current_user().as_ref())
    }
}

/// Everything one browser keeps between requests.
pub struct BrowserContext<S> {
    pub session: SessionStore<S>,
    pub notifications: Notifier<S>,
    pub drafts: Drafts<S>,
}

impl<S: SlotStore + Clone> BrowserContext<S> {
    pub fn new(slots: S) -> Self {
        BrowserContext {
            session: SessionStore::new(slots.clone()),
            notifications: Notifier::new(slots.clone()),
            drafts: Drafts::new(slots),
        }
    }
}

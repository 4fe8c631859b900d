use std::path::Path;
use std::rc::Rc;

use tracing::{info, warn};

use crate::auth::AuthFlag;
use crate::collection::LoadOutcome;
use crate::error::StoreError;
use crate::history::History;
use crate::portfolio::Portfolio;
use crate::storage::{BackingStore, SledStore};

/// The three persisted collections, constructed once at startup and handed
/// to every consumer explicitly.
pub struct AppState {
    backing: Rc<dyn BackingStore>,
    pub portfolio: Portfolio,
    pub history: History,
    pub auth: AuthFlag,
}

impl AppState {
    pub fn open(db_path: impl AsRef<Path>) -> Result<AppState, StoreError> {
        let store = SledStore::open(db_path.as_ref())?;
        info!("Database ready at {}", db_path.as_ref().display());
        Ok(AppState::load(Rc::new(store)))
    }

    pub fn load(backing: Rc<dyn BackingStore>) -> AppState {
        let (portfolio, portfolio_outcome) = Portfolio::load(Rc::clone(&backing));
        report("portfolio", &portfolio_outcome);
        let (history, history_outcome) = History::load(Rc::clone(&backing));
        report("history", &history_outcome);
        let auth = AuthFlag::load(Rc::clone(&backing));

        AppState {
            backing,
            portfolio,
            history,
            auth,
        }
    }

    /// True if any durable write failed this session.
    pub fn has_unsaved_changes(&self) -> bool {
        self.portfolio.write_failures()
            + self.history.write_failures()
            + self.auth.write_failures()
            > 0
    }

    pub fn shutdown(self) -> Result<(), StoreError> {
        if self.has_unsaved_changes() {
            warn!("some changes could not be saved and will be lost");
        }
        self.backing.flush()
    }
}

fn report(collection: &str, outcome: &LoadOutcome) {
    match outcome {
        LoadOutcome::Missing => info!(collection, "no saved data"),
        LoadOutcome::Loaded { kept, expired } => {
            info!(collection, kept, expired, "loaded saved data")
        }
        LoadOutcome::Recovered { reason } => {
            warn!(collection, %reason, "saved data was unreadable, starting empty")
        }
    }
}

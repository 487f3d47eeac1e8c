use std::{ops::Deref, sync::Arc};

use crate::admin::WhitelistAdmin;
use crate::config::Config;

/// Shared state handed to Discord commands
pub struct DataInner {
    pub config: Arc<Config>,
    pub admin: WhitelistAdmin,
}

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("config", &self.config)
            .field("allow_list", self.admin.allow_list())
            .finish()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    #[must_use]
    pub fn new(config: Arc<Config>, admin: WhitelistAdmin) -> Self {
        Self(Arc::new(DataInner { config, admin }))
    }
}

use std::sync::Arc;

use crate::cache::{CacheAdmin, CacheMonitor};

#[derive(Clone)]
pub struct AdminState {
    pub admin: Arc<CacheAdmin>,
}

impl AdminState {
    pub fn new(admin: Arc<CacheAdmin>) -> Self {
        Self { admin }
    }

    pub(super) fn monitor(&self) -> &CacheMonitor {
        self.admin.monitor()
    }
}

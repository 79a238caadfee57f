use std::sync::Arc;

use crate::core::config::Settings;
use crate::repositories::exams::ExamStore;
use crate::services::notifications::Notifier;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: Arc<dyn ExamStore>,
    notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        store: Arc<dyn ExamStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, store, notifier }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &dyn ExamStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn notifier(&self) -> Arc<dyn Notifier> {
        self.inner.notifier.clone()
    }

    pub(crate) fn write_retries(&self) -> u32 {
        self.inner.settings.exam().write_retries
    }
}

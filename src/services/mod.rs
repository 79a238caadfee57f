pub(crate) mod aggregate;
pub(crate) mod answers;
pub(crate) mod catalog;
pub(crate) mod errors;
pub(crate) mod grading;
pub(crate) mod notifications;
pub(crate) mod release;
pub(crate) mod resolver;
pub(crate) mod results;
pub(crate) mod retake;
pub(crate) mod session;
pub(crate) mod submission_finalize;

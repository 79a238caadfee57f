pub(crate) mod exams;

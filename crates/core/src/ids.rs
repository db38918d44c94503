//! Entity identifiers.
//!
//! Every entity is identified by a monotonic integer assigned by the durable
//! store (see SPEC §3): no nanoid/uuid generation happens client-side.

crate::define_id! {
    /// Identifies a job.
    pub struct JobId;
}

crate::define_id! {
    /// Identifies a user.
    pub struct UserId;
}

crate::define_id! {
    /// Identifies a runner's durable identity (the credential row), distinct
    /// from its ephemeral online-runner record, which is keyed by the same id.
    pub struct RunnerId;
}

crate::define_id! {
    /// Identifies a per-user settings record.
    pub struct SettingsId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_i64() {
        let id = JobId::from(42i64);
        assert_eq!(id.get(), 42);
        assert_eq!(i64::from(id), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn ids_of_different_kinds_are_distinct_types() {
        let job = JobId::new(1);
        let user = UserId::new(1);
        assert_eq!(job.get(), user.get());
    }
}

//! Status helper enums mapping to SMALLSERIAL lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

use catalog_core::job::JobStatus;

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant by its database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                $(
                    if id == $val {
                        return Some(Self::$variant);
                    }
                )+
                None
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Catalog job lifecycle status (`job_statuses`).
    JobStatusId {
        Pending = 1,
        Running = 2,
        Succeeded = 3,
        Failed = 4,
        Cancelled = 5,
    }
}

impl From<JobStatus> for JobStatusId {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => Self::Pending,
            JobStatus::Running => Self::Running,
            JobStatus::Succeeded => Self::Succeeded,
            JobStatus::Failed => Self::Failed,
            JobStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl From<JobStatusId> for JobStatus {
    fn from(id: JobStatusId) -> Self {
        match id {
            JobStatusId::Pending => Self::Pending,
            JobStatusId::Running => Self::Running,
            JobStatusId::Succeeded => Self::Succeeded,
            JobStatusId::Failed => Self::Failed,
            JobStatusId::Cancelled => Self::Cancelled,
        }
    }
}

/// Terminal statuses: succeeded, failed, cancelled.
pub const TERMINAL_STATUSES: [StatusId; 3] = [
    JobStatusId::Succeeded as StatusId,
    JobStatusId::Failed as StatusId,
    JobStatusId::Cancelled as StatusId,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_domain_status() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            let id = JobStatusId::from(status).id();
            let back = JobStatusId::from_id(id).map(JobStatus::from);
            assert_eq!(back, Some(status));
        }
    }

    #[test]
    fn unknown_id_is_rejected() {
        assert_eq!(JobStatusId::from_id(0), None);
        assert_eq!(JobStatusId::from_id(9), None);
    }

    #[test]
    fn terminal_ids_match_domain_terminal_statuses() {
        for id in TERMINAL_STATUSES {
            let status = JobStatusId::from_id(id).map(JobStatus::from).unwrap();
            assert!(status.is_terminal());
        }
    }
}

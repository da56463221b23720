use serde::{Deserialize, Serialize};

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            pub fn get(&self) -> $inner {
                self.0
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Primary key of a team.
    TeamId(i32)
);
row_id!(
    /// Primary key of a pipeline.
    PipelineId(i32)
);
row_id!(
    /// Primary key of a pipeline resource-type row.
    ResourceTypeId(i32)
);
row_id!(
    /// Primary key of a resolved, checkable resource config.
    ResourceConfigId(i32)
);
row_id!(
    /// Primary key of a discovered resource version.
    ResourceVersionId(i64)
);

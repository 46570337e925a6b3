use uuid::Uuid;

/// Fixed-point scale used for every cash/price field in the workspace (1e-6).
pub const MICROS_SCALE: i64 = 1_000_000;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(u: Uuid) -> Self {
                Self(u)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(TraderId);
id_newtype!(PortfolioId);
id_newtype!(PositionId);
id_newtype!(OrderId);
id_newtype!(DecisionId);
id_newtype!(WeightHistoryId);
id_newtype!(TransactionId);

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        #[sqlx(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// Identificador de Dueño (Owner) usando NewType Pattern.
    OwnerId
);

id_newtype!(
    /// Identificador de Agente usando NewType Pattern.
    AgentId
);

id_newtype!(
    /// Identificador de Billetera usando NewType Pattern.
    WalletId
);

id_newtype!(
    /// Identificador de Transacción.
    TransactionId
);

id_newtype!(
    /// Identificador de Regla de Gasto.
    RuleId
);

id_newtype!(
    /// Identificador de Kill Switch.
    KillSwitchId
);

id_newtype!(
    /// Identificador de Política Cross-Agent.
    PolicyId
);

id_newtype!(
    /// Identificador de Transacción Cross-Agent.
    CrossAgentTxId
);

id_newtype!(
    /// Identificador de Grupo de Agentes.
    GroupId
);

id_newtype!(
    /// Identificador de Evento (dead-man, spawn, audit).
    EventId
);

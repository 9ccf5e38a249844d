use ftpd_contracts::{FTP_IP_LIMIT, FTP_TOO_MANY_USERS};
use ftpd_ledger::LaunchDescriptor;

use crate::config::Tunables;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionLimits {
    pub max_clients: u32,
    pub max_per_ip: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Admit,
    TooManyClients,
    TooManyFromAddress,
}

impl AdmissionLimits {
    pub fn from_tunables(tunables: &Tunables) -> Self {
        AdmissionLimits {
            max_clients: tunables.max_clients,
            max_per_ip: tunables.max_per_ip,
        }
    }

    /// Judges a launched worker by the counts it was handed. A limit of 0 is
    /// no limit; the global limit is checked first.
    pub fn check(&self, descriptor: &LaunchDescriptor) -> Verdict {
        if self.max_clients > 0 && descriptor.ordinal > self.max_clients {
            return Verdict::TooManyClients;
        }
        if self.max_per_ip > 0 && descriptor.rank_for_address > self.max_per_ip {
            return Verdict::TooManyFromAddress;
        }
        Verdict::Admit
    }
}

impl Verdict {
    pub fn refusal(self) -> Option<(u16, &'static str)> {
        match self {
            Verdict::Admit => None,
            Verdict::TooManyClients => Some((
                FTP_TOO_MANY_USERS,
                "There are too many connected users, please try later.",
            )),
            Verdict::TooManyFromAddress => Some((
                FTP_IP_LIMIT,
                "There are too many connections from your internet address.",
            )),
        }
    }
}

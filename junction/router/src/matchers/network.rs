use junction_core::Network;

use crate::condition::Condition;
use crate::context::RoutingContext;

const SLOTS: usize = 3;

/// A fixed-size boolean table indexed by the network enum.
pub struct NetworkMatcher {
    table: [bool; SLOTS],
}

impl NetworkMatcher {
    pub fn new(networks: &[Network]) -> Self {
        let mut table = [false; SLOTS];
        for n in networks {
            table[slot(*n)] = true;
        }
        Self { table }
    }
}

fn slot(n: Network) -> usize {
    match n {
        Network::Tcp => 0,
        Network::Udp => 1,
        Network::Unix => 2,
    }
}

impl Condition for NetworkMatcher {
    fn matches(&self, ctx: &RoutingContext) -> bool {
        self.table[slot(ctx.network)]
    }

    fn name(&self) -> &'static str {
        "network"
    }
}

use weighbridge_core::Actor;

/// Operator making the request, taken from the `x-actor` header.
///
/// Present on every route except `/health`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    actor: Actor,
}

impl ActorContext {
    pub fn new(actor: Actor) -> Self {
        Self { actor }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }
}

use cucumber::given;

use crate::cucumber::{ticket_world::TicketSystem, TicketWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut TicketWorld) {
    let system = TicketSystem::new().await;
    world.system = Some(system);
}

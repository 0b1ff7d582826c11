mod setups;
mod steps;
pub mod ticket_world;

pub use ticket_world::TicketWorld;

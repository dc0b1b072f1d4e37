pub mod coffees;

pub use coffees::CoffeesDataSource;

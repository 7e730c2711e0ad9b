use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    drivestats::example_apps::run_synthetic_fleet_demo(std::env::args().skip(1))
}

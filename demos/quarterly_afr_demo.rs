#![cfg(feature = "parquet")]

use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    drivestats::example_apps::run_quarterly_afr_demo(std::env::args().skip(1))
}

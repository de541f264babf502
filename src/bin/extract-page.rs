use formation_harvester::parcoursup;
use std::{env, fs, process};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("Usage: extract-page <file.html>");
            process::exit(2);
        }
    };

    let html = fs::read_to_string(&path)?;
    println!("{}", parcoursup::parse(&html));
    Ok(())
}

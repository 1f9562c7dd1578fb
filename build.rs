use clap::CommandFactory;
use std::fs;
use std::path::PathBuf;

include!("src/cli.rs");

fn main() -> std::io::Result<()> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_dir = PathBuf::from(std::env::var("OUT_DIR").unwrap());
    let man_dir = out_dir.join("../../../man");
    fs::create_dir_all(&man_dir)?;

    let cmd = Cli::command();
    let page = man_dir.join(format!("{}.1", cmd.get_name()));

    let mut buffer = Vec::new();
    clap_mangen::Man::new(cmd).render(&mut buffer)?;
    fs::write(&page, buffer)?;

    println!("cargo:warning=Man page generated at {:?}", page);

    Ok(())
}

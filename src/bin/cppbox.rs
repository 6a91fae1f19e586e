use anyhow::Result;

fn main() -> Result<()> {
    cppbox::cli::run()
}

fn main() -> anyhow::Result<()> {
    blinkwatch_lib::run()
}

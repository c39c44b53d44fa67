fn main() -> anyhow::Result<()> {
    sweep::run()
}

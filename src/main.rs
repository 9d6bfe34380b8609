use vista_ngin::config::Config;

fn main() -> anyhow::Result<()> {
    vista_ngin::flow::run(Config::default().with_env_overrides())
}

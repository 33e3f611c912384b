use crate::commands::{
    block_on, into_result, load_config, CommandResult, Failure, GlobalOptions, Store,
};

pub fn run(options: &GlobalOptions) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return into_result("migrate", failure),
    };

    let result = block_on(async {
        let store = Store::open(&config).await?;
        store.close().await;
        Ok::<(), Failure>(())
    })
    .and_then(|inner| inner);

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => into_result("migrate", failure),
    }
}

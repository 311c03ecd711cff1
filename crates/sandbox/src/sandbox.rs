use crate::api;
use crate::binding::ExchangeBinding;
use crate::constants::CONSTANTS;
use crate::control::ControlHandle;
use crate::error::ScriptError;
use crate::interrupt::{self, Halt, InterruptHandle};
use configuration::SandboxConfig;
use rhai::{Array, Dynamic, Engine, EvalAltResult, Scope};

/// Names under which the trader's control handle is visible to scripts.
pub const GLOBAL_ALIASES: [&str; 2] = ["Global", "G"];
/// Names of the first exchange binding.
pub const EXCHANGE_ALIASES: [&str; 2] = ["Exchange", "E"];
/// Names of the ordered list of every exchange binding.
pub const EXCHANGES_ALIASES: [&str; 2] = ["Exchanges", "Es"];

/// One isolated script environment, used for exactly one run of one
/// strategy script.
///
/// The interpreter polls the interruption channel before every operation, so
/// an interruption posted through [`Sandbox::interrupt_handle`] runs on the
/// script's own thread at the next instruction boundary.
pub struct Sandbox {
    engine: Engine,
    scope: Scope<'static>,
    interrupts: InterruptHandle,
}

impl Sandbox {
    pub fn new(config: &SandboxConfig) -> Self {
        let (interrupts, receiver) = interrupt::channel();

        let mut engine = Engine::new();
        engine.set_max_operations(config.max_operations);
        engine.set_max_call_levels(config.max_call_levels);
        engine.on_progress(move |_| receiver.poll().err().map(Dynamic::from));
        engine.on_print(|text| tracing::debug!(target: "script", "{}", text));
        api::register(&mut engine);

        Self {
            engine,
            scope: Scope::new(),
            interrupts,
        }
    }

    /// The sending side of this sandbox's interruption channel.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupts.clone()
    }

    /// Binds every global constant under its own name.
    pub fn bind_constants(&mut self) {
        for name in CONSTANTS {
            self.scope.push_constant(*name, name.to_string());
        }
    }

    /// Binds the control handle and the exchange bindings under their
    /// aliases. The singular exchange aliases are only bound when there is at
    /// least one exchange.
    pub fn bind(&mut self, control: &ControlHandle, exchanges: &[ExchangeBinding]) {
        for alias in GLOBAL_ALIASES {
            self.scope.push(alias, control.clone());
        }
        if let Some(first) = exchanges.first() {
            for alias in EXCHANGE_ALIASES {
                self.scope.push(alias, first.clone());
            }
        }
        let all: Array = exchanges.iter().cloned().map(Dynamic::from).collect();
        for alias in EXCHANGES_ALIASES {
            self.scope.push(alias, all.clone());
        }
    }

    /// True when `name` resolves to a binding in this sandbox.
    pub fn is_bound(&self, name: &str) -> bool {
        self.scope.contains(name)
    }

    /// Runs `script` to completion, until it fails, or until it is halted.
    pub fn run(&mut self, script: &str) -> Result<(), ScriptError> {
        match self.engine.run_with_scope(&mut self.scope, script) {
            Ok(()) => Ok(()),
            Err(e) if is_halt(&e) => Err(ScriptError::Halted),
            Err(e) => Err(ScriptError::Runtime(e.to_string())),
        }
    }
}

/// Whether an interpreter error is the halt signal, possibly raised from
/// inside a function call.
fn is_halt(err: &EvalAltResult) -> bool {
    match err {
        EvalAltResult::ErrorTerminated(token, _) => token.is::<Halt>(),
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => is_halt(inner),
        EvalAltResult::ErrorInModule(_, inner, _) => is_halt(inner),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingFactory;
    use crate::control::TraderControl;
    use core_types::{Credentials, ExchangeConfig, Strategy, TraderRecord, TraderStatus};
    use events::{LogLevel, MemorySink, TraderLogger};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    struct Fixture {
        sandbox: Sandbox,
        control: ControlHandle,
        sink: Arc<MemorySink>,
    }

    fn account(kind: &str) -> ExchangeConfig {
        ExchangeConfig {
            id: 1,
            user_id: 4,
            name: kind.to_string(),
            kind: kind.to_string(),
            credentials: Credentials {
                access_key: "k".to_string(),
                secret_key: "s".to_string(),
            },
        }
    }

    fn fixture(config: &SandboxConfig, accounts: &[ExchangeConfig]) -> Fixture {
        let sink = Arc::new(MemorySink::new());
        let logger = TraderLogger::global(2, sink.clone());
        let mut sandbox = Sandbox::new(config);
        let handle = sandbox.interrupt_handle();

        let trader = TraderRecord {
            id: 2,
            user_id: 4,
            name: "mm".to_string(),
            strategy_id: 1,
            status: TraderStatus::Idle,
            last_run_at: None,
        };
        let strategy = Strategy {
            id: 1,
            user_id: 4,
            name: "s".to_string(),
            script: String::new(),
        };
        let control = Arc::new(TraderControl::new(
            trader,
            strategy,
            logger.clone(),
            handle.clone(),
            Duration::from_millis(config.sleep_slice_ms),
        ));
        let bindings = BindingFactory::default()
            .build(2, accounts, &handle, &logger)
            .unwrap();

        sandbox.bind_constants();
        sandbox.bind(&control, &bindings);
        Fixture { sandbox, control, sink }
    }

    #[test]
    fn every_alias_and_constant_is_bound() {
        let f = fixture(&SandboxConfig::default(), &[account("paper")]);
        for name in GLOBAL_ALIASES.iter().chain(&EXCHANGE_ALIASES).chain(&EXCHANGES_ALIASES) {
            assert!(f.sandbox.is_bound(name), "{} is not bound", name);
        }
        for name in CONSTANTS {
            assert!(f.sandbox.is_bound(name), "{} is not bound", name);
        }
    }

    #[test]
    fn aliases_resolve_to_the_same_handles() {
        let mut f = fixture(&SandboxConfig::default(), &[account("paper"), account("binance")]);
        let script = r#"
            if Global.id != G.id || G.id != 2 { throw "control alias"; }
            if E.index != 0 || Exchange.kind != "paper" { throw "exchange alias"; }
            if Es.len() != 2 || Exchanges[1].GetType() != binance { throw "exchanges alias"; }
            if BUY != "BUY" { throw "constant"; }
        "#;
        assert_eq!(f.sandbox.run(script), Ok(()));
    }

    #[test]
    fn no_exchanges_leaves_the_singular_alias_unbound() {
        let f = fixture(&SandboxConfig::default(), &[]);
        assert!(!f.sandbox.is_bound("E"));
        assert!(f.sandbox.is_bound("Es"));
    }

    #[test]
    fn script_errors_are_runtime_errors() {
        let mut f = fixture(&SandboxConfig::default(), &[]);
        assert!(matches!(f.sandbox.run(r#"throw "boom";"#), Err(ScriptError::Runtime(m)) if m.contains("boom")));
        assert!(matches!(f.sandbox.run("let x = ;"), Err(ScriptError::Runtime(_))));
    }

    #[test]
    fn halt_posted_from_another_thread_stops_an_endless_loop() {
        let mut f = fixture(&SandboxConfig::default(), &[]);
        let handle = f.sandbox.interrupt_handle();

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            handle.halt()
        });
        assert_eq!(f.sandbox.run("while true {}"), Err(ScriptError::Halted));
        assert_eq!(stopper.join().unwrap(), Ok(()));
    }

    #[test]
    fn try_catch_cannot_swallow_the_halt() {
        let mut f = fixture(&SandboxConfig::default(), &[]);
        let handle = f.sandbox.interrupt_handle();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            handle.halt()
        });

        let script = r#"
            let caught = false;
            try { while true {} } catch { caught = true; }
            G.Log("survived");
        "#;
        assert_eq!(f.sandbox.run(script), Err(ScriptError::Halted));
        assert!(f.sink.events().is_empty());
    }

    #[test]
    fn halt_inside_script_functions_is_still_a_halt() {
        let mut f = fixture(&SandboxConfig::default(), &[]);
        let handle = f.sandbox.interrupt_handle();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            handle.halt()
        });

        let script = "fn spin() { loop { } } spin();";
        assert_eq!(f.sandbox.run(script), Err(ScriptError::Halted));
    }

    #[test]
    fn sleep_is_cut_short_by_a_halt() {
        let config = SandboxConfig {
            sleep_slice_ms: 5,
            ..SandboxConfig::default()
        };
        let mut f = fixture(&config, &[]);
        let handle = f.sandbox.interrupt_handle();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            handle.halt()
        });

        let begin = Instant::now();
        assert_eq!(f.sandbox.run("G.Sleep(60000);"), Err(ScriptError::Halted));
        assert!(begin.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn non_halting_interrupt_during_sleep_lets_the_script_continue() {
        let config = SandboxConfig {
            sleep_slice_ms: 5,
            ..SandboxConfig::default()
        };
        let mut f = fixture(&config, &[]);
        let handle = f.sandbox.interrupt_handle();
        let poster = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            handle.post(Box::new(|| Ok(())))
        });

        assert_eq!(f.sandbox.run(r#"G.Sleep(200); G.Log("after");"#), Ok(()));
        assert_eq!(poster.join().unwrap(), Ok(()));
        let messages: Vec<String> = f.sink.events().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["after".to_string()]);
    }

    #[test]
    fn operation_limit_ends_runaway_scripts() {
        let config = SandboxConfig {
            max_operations: 10_000,
            ..SandboxConfig::default()
        };
        let mut f = fixture(&config, &[]);
        assert!(matches!(f.sandbox.run("loop {}"), Err(ScriptError::Runtime(_))));
    }

    #[test]
    fn control_api_logs_through_the_global_logger() {
        let mut f = fixture(&SandboxConfig::default(), &[]);
        let script = r#"
            G.Log("hello " + G.name);
            G.LogProfit(12.5);
            G.AddTask(|a, b| a + b, [1, 2]);
            G.AddTask(|| 10);
            let results = G.ExecTasks();
            if results != [3, 10] { throw "tasks"; }
            if G.ExecTasks().len() != 0 { throw "tasks not drained"; }
        "#;
        assert_eq!(f.sandbox.run(script), Ok(()));

        let events = f.sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].level, LogLevel::Info);
        assert_eq!(events[0].message, "hello mm");
        assert_eq!(events[0].exchange_type, "global");
        assert_eq!(events[1].level, LogLevel::Profit);
        assert_eq!(f.control.status(), TraderStatus::Idle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scripts_trade_on_the_paper_exchange() {
        let mut f = fixture(&SandboxConfig::default(), &[account("paper")]);
        let script = r#"
            let id = E.Buy("BTCUSDT", 100, 2);
            let order = E.GetOrder("BTCUSDT", id);
            if order.status != ORDER_FILLED || order.side != BUY { throw "order"; }
            let account = E.GetAccount();
            if account.BTC.free != 2.0 { throw "balance"; }
            E.Sell("BTCUSDT", 1000, 1);
        "#;
        let sink = f.sink.clone();
        let result = tokio::task::spawn_blocking(move || f.sandbox.run(script))
            .await
            .unwrap();
        assert_eq!(result, Ok(()));

        let levels: Vec<LogLevel> = sink.events().iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![LogLevel::Buy, LogLevel::Sell]);
    }
}

//! 对话路由集成测试

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chatflow::adapter::MockAdapter;
    use chatflow::config::{DefaultAction, DialogSection};
    use chatflow::hooks::{Registry, ScriptMethod};
    use chatflow::lexicon::Lexicons;
    use chatflow::matcher::match_triggers;
    use chatflow::message::SELF_SEND;
    use chatflow::session::{JsonFileSessionStorage, Session, SessionHandle, SessionManager, StepRef, StorageKey};
    use chatflow::{compile, Context, DialogError, DialogRouter, InboundMessage, RouteStatus, RouterBuilder};
    use serde_json::{json, Value};

    fn name_script() -> Value {
        json!({
            "greet": {"trigger": {"kind": "text", "values": ["hi"]}, "message": "hello", "goto": "ask_name"},
            "ask_name": {"message": "what is your name?", "store": true, "validate": {"validator": "text"}}
        })
    }

    fn builder(script: Value, tg: &Arc<MockAdapter>) -> RouterBuilder {
        DialogRouter::builder(compile(&script).unwrap()).with_bridge(tg.clone())
    }

    fn key() -> StorageKey {
        StorageKey::new("tg", "100", "7")
    }

    fn text(body: &str) -> InboundMessage {
        InboundMessage::text("100", "7", body)
    }

    async fn preload_step(router: &DialogRouter, path: &str) {
        let session = Session {
            step: Some(StepRef { path: path.to_string() }),
            ..Session::default()
        };
        router.sessions().storage().save(&key().to_string(), &session).await.unwrap();
    }

    struct Explode;

    #[async_trait]
    impl ScriptMethod for Explode {
        fn name(&self) -> &str {
            "explode"
        }

        async fn call(&self, _ctx: &mut Context, _params: &Value) -> Result<(), String> {
            Err("boom".to_string())
        }
    }

    struct RememberNick;

    #[async_trait]
    impl ScriptMethod for RememberNick {
        fn name(&self) -> &str {
            "remember_nick"
        }

        async fn call(&self, ctx: &mut Context, params: &Value) -> Result<(), String> {
            let nick = params.get("nick").cloned().ok_or("missing nick")?;
            ctx.session_mut().data_mut().extra.insert("nick".to_string(), nick);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_greeting_moves_to_question() {
        let tg = Arc::new(MockAdapter::new("tg"));
        let router = builder(name_script(), &tg).build();

        let outcome = router.handle("tg", text("hi")).await.unwrap();
        assert_eq!(outcome.status, RouteStatus::Handled);
        assert_eq!(outcome.executed.as_deref(), Some("greet"));
        assert_eq!(tg.messages(), vec!["hello", "what is your name?"]);

        let stored = router.sessions().peek(&key()).await.unwrap().unwrap();
        assert_eq!(stored.step.unwrap().path, "ask_name");
    }

    #[tokio::test]
    async fn test_answer_is_stored_and_dialog_ends() {
        let tg = Arc::new(MockAdapter::new("tg"));
        let router = builder(name_script(), &tg).build();
        router.handle("tg", text("hi")).await.unwrap();
        tg.clear();

        let outcome = router.handle("tg", text("Alice")).await.unwrap();
        assert!(outcome.executed.is_none());
        assert!(tg.messages().is_empty());

        let stored = router.sessions().peek(&key()).await.unwrap().unwrap();
        assert_eq!(stored.step.as_ref().unwrap().path, "ask_name");
        let answers = &stored.answers["ask_name"];
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].answer, json!("Alice"));
        assert_eq!(answers[0].message, "what is your name?");
    }

    #[tokio::test]
    async fn test_failed_validation_shows_help_and_keeps_step() {
        let tg = Arc::new(MockAdapter::new("tg"));
        let router = builder(
            json!({
                "age": {
                    "message": "How old are you?",
                    "validate": {
                        "validator": "number",
                        "params": {"min": 1, "max": 5},
                        "success": "done",
                        "failure": {"help": "age_help"}
                    }
                },
                "age_help": {"trigger": "/age_help", "message": "Pick a number from 1 to 5"},
                "done": {"trigger": "/done", "message": "Thanks"}
            }),
            &tg,
        )
        .build();
        preload_step(&router, "age").await;

        let outcome = router.handle("tg", text("7")).await.unwrap();
        assert!(outcome.executed.is_none());
        assert!(outcome.delivery.is_some());
        assert_eq!(tg.messages(), vec!["Pick a number from 1 to 5"]);
        let stored = router.sessions().peek(&key()).await.unwrap().unwrap();
        assert_eq!(stored.step.unwrap().path, "age");

        tg.clear();
        let outcome = router.handle("tg", text("3")).await.unwrap();
        assert_eq!(outcome.executed.as_deref(), Some("done"));
        assert_eq!(tg.messages(), vec!["Thanks"]);
    }

    #[tokio::test]
    async fn test_trigger_list_requires_every_spec() {
        let script = compile(&json!({
            "x": {
                "trigger": [{"kind": "bridge", "values": ["tg"]}, {"kind": "text", "values": ["ok"]}],
                "message": "x"
            }
        }))
        .unwrap();
        let node = script.node("x").unwrap();
        let registry = Registry::new();

        fn context(bridge: &str, body: &str) -> Context {
            Context::new(
                InboundMessage::text("1", "2", body),
                Arc::new(MockAdapter::new(bridge)),
                SessionHandle::detached(),
                Arc::new(Lexicons::new("en")),
                "en",
            )
        }

        let on_vk = context("vk", "ok");
        assert!(!match_triggers(&on_vk, &registry, &node.trigger).await);
        let on_tg = context("tg", "ok");
        assert!(match_triggers(&on_tg, &registry, &node.trigger).await);
        let wrong_text = context("tg", "nope");
        assert!(!match_triggers(&wrong_text, &registry, &node.trigger).await);
    }

    #[test]
    fn test_clean_store_keeps_single_entry() {
        let mut handle = SessionHandle::new(key(), Session::default());
        handle.store_answer("t", None, "q1", json!("a"), false);
        handle.store_answer("t", None, "q2", json!("b"), false);
        handle.store_answer("other", None, "q", json!("x"), false);
        assert_eq!(handle.answers("t").len(), 2);

        handle.store_answer("t", None, "q3", json!("c"), true);
        assert_eq!(handle.answers("t").len(), 1);
        assert_eq!(handle.answers("t")[0].answer, json!("c"));
        assert_eq!(handle.answers("other").len(), 1);
    }

    #[tokio::test]
    async fn test_same_event_resolves_to_same_node() {
        let tg = Arc::new(MockAdapter::new("tg"));
        let router = builder(
            json!({
                "q": {
                    "message": "Ready?",
                    "validate": {"validator": "values", "params": ["yes", "no"], "success": "go", "failure": {"help": "retry"}}
                },
                "go": {"trigger": "/go", "message": "Great"},
                "retry": {"trigger": "/retry", "message": "Please answer yes or no"}
            }),
            &tg,
        )
        .build();

        let session = Session {
            step: Some(StepRef { path: "q".to_string() }),
            ..Session::default()
        };
        let message = text("yes");
        let mut executed = Vec::new();
        for _ in 0..2 {
            let handle = SessionHandle::new(key(), session.clone());
            let mut ctx = router.context(tg.clone(), message.clone(), handle);
            executed.push(router.route(&mut ctx).await.unwrap().executed);
        }
        assert_eq!(executed[0].as_deref(), Some("go"));
        assert_eq!(executed[0], executed[1]);
    }

    #[tokio::test]
    async fn test_self_goto_runs_once() {
        let tg = Arc::new(MockAdapter::new("tg"));
        let router = builder(json!({"again": {"trigger": "go", "message": "again", "goto": "again"}}), &tg).build();

        router.handle("tg", text("go")).await.unwrap();
        assert_eq!(tg.messages(), vec!["again"]);
    }

    #[tokio::test]
    async fn test_two_node_cycle_is_cut_by_hop_limit() {
        let tg = Arc::new(MockAdapter::new("tg"));
        let router = builder(
            json!({
                "a": {"trigger": "ping", "message": "a", "goto": "b"},
                "b": {"message": "b", "goto": "a"}
            }),
            &tg,
        )
        .with_dialog(DialogSection {
            max_chain_hops: 5,
            ..DialogSection::default()
        })
        .build();

        router.handle("tg", text("ping")).await.unwrap();
        assert_eq!(tg.messages(), vec!["a", "b", "a", "b", "a"]);
    }

    #[tokio::test]
    async fn test_help_cycle_is_cut_by_hop_limit() {
        let tg = Arc::new(MockAdapter::new("tg"));
        let router = builder(
            json!({
                "ping": {"trigger": "go", "message": "ping", "goto": {"success": {"help": "pong"}}},
                "pong": {"trigger": "/pong", "message": "pong", "goto": {"success": {"help": "ping"}}}
            }),
            &tg,
        )
        .with_dialog(DialogSection {
            max_chain_hops: 4,
            ..DialogSection::default()
        })
        .build();

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(3), router.handle("tg", text("go")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.executed.as_deref(), Some("ping"));
        assert_eq!(tg.messages(), vec!["ping", "pong", "ping", "pong"]);
    }

    #[tokio::test]
    async fn test_command_beats_active_step() {
        let tg = Arc::new(MockAdapter::new("tg"));
        let mut script = name_script();
        script["restart"] = json!({"command": true, "trigger": "/start", "message": "Restarted", "goto": "ask_name"});
        let router = builder(script, &tg).build();
        preload_step(&router, "ask_name").await;

        let outcome = router.handle("tg", text("/start")).await.unwrap();
        assert_eq!(outcome.executed.as_deref(), Some("restart"));
        assert_eq!(tg.messages(), vec!["Restarted", "what is your name?"]);

        let stored = router.sessions().peek(&key()).await.unwrap().unwrap();
        assert!(stored.answers.get("ask_name").is_none());
        assert_eq!(stored.step.unwrap().path, "ask_name");
    }

    #[tokio::test]
    async fn test_deep_link_does_not_move_session() {
        let tg = Arc::new(MockAdapter::new("tg"));
        let router = builder(
            json!({
                "menu": {
                    "trigger": "menu",
                    "message": "Menu",
                    "c": {
                        "a": {"trigger": "a", "message": "A"},
                        "b": {"trigger": "b", "message": "B"}
                    }
                }
            }),
            &tg,
        )
        .build();

        let mut message = text("b");
        message.query.path = Some("menu.c".to_string());
        let outcome = router.handle("tg", message).await.unwrap();
        assert_eq!(outcome.executed.as_deref(), Some("menu.c.b"));
        assert_eq!(tg.messages(), vec!["B"]);
        assert!(router.sessions().peek(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_default_help_when_nothing_matches() {
        let script = json!({
            "greet": {"trigger": "hi", "message": "hello"},
            "help": {"trigger": "/help", "message": "Say hi"}
        });

        let tg = Arc::new(MockAdapter::new("tg"));
        let router = builder(script.clone(), &tg).build();
        let outcome = router.handle("tg", text("blah")).await.unwrap();
        assert!(outcome.executed.is_none());
        assert!(tg.messages().is_empty());

        let router = builder(script, &tg)
            .with_dialog(DialogSection {
                default_action: DefaultAction::Help,
                ..DialogSection::default()
            })
            .build();
        let outcome = router.handle("tg", text("blah")).await.unwrap();
        assert_eq!(outcome.executed.as_deref(), Some("help"));
        assert_eq!(tg.messages(), vec!["Say hi"]);
        assert!(router.sessions().peek(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_self_echo_and_processed_guards() {
        let tg = Arc::new(MockAdapter::new("tg"));
        let router = builder(name_script(), &tg).build();

        let echo = InboundMessage::text("100", SELF_SEND, "hi");
        let outcome = router.handle("tg", echo).await.unwrap();
        assert_eq!(outcome.status, RouteStatus::SelfEcho);
        assert!(tg.messages().is_empty());

        let mut ctx = router.context(tg.clone(), text("hi"), SessionHandle::detached());
        let first = router.route(&mut ctx).await.unwrap();
        assert_eq!(first.status, RouteStatus::Handled);
        assert!(ctx.is_processed());
        let second = router.route(&mut ctx).await.unwrap();
        assert_eq!(second.status, RouteStatus::AlreadyProcessed);
        assert_eq!(tg.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_bridge_is_config_error() {
        let tg = Arc::new(MockAdapter::new("tg"));
        let router = builder(name_script(), &tg).build();
        let err = router.handle("vk", text("hi")).await.unwrap_err();
        assert!(matches!(err, DialogError::Config(_)));
    }

    #[tokio::test]
    async fn test_failing_method_does_not_abort_step() {
        let tg = Arc::new(MockAdapter::new("tg"));
        let mut registry = Registry::new();
        registry.register_method(Explode).register_method(RememberNick);
        let router = builder(
            json!({
                "boom": {"trigger": "boom", "action": "explode", "message": "still here"},
                "nick": {
                    "command": true,
                    "trigger": "/nick",
                    "action": {"type": "method", "name": "remember_nick", "params": {"nick": "bob"}},
                    "message": "noted"
                }
            }),
            &tg,
        )
        .with_registry(registry)
        .build();

        router.handle("tg", text("boom")).await.unwrap();
        assert_eq!(tg.messages(), vec!["still here"]);

        router.handle("tg", text("/nick")).await.unwrap();
        assert_eq!(tg.messages(), vec!["still here", "noted"]);
        let stored = router.sessions().peek(&key()).await.unwrap().unwrap();
        assert_eq!(stored.extra.get("nick"), Some(&json!("bob")));
    }

    #[tokio::test]
    async fn test_delivery_failure_propagates_without_saving() {
        let tg = Arc::new(MockAdapter::new("tg").failing());
        let router = builder(name_script(), &tg).build();

        let err = router.handle("tg", text("hi")).await.unwrap_err();
        assert!(matches!(err, DialogError::Delivery(_)));
        assert!(router.sessions().peek(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_send_action_forwards_answers() {
        let tg = Arc::new(MockAdapter::new("tg"));
        let ops = Arc::new(MockAdapter::new("ops"));
        let router = builder(
            json!({
                "order": {
                    "trigger": "buy",
                    "message": "How many?",
                    "keyboard": {"buttons": [["1", "2"]], "options": ["oneTime"]},
                    "store": true,
                    "validate": {"validator": "number", "success": "done"}
                },
                "done": {
                    "trigger": "/done",
                    "message": "Thanks",
                    "action": {"type": "send", "params": {"target": {"ops": ["admin"]}, "message": "New order", "from_thread": "order"}}
                }
            }),
            &tg,
        )
        .with_bridge(ops.clone())
        .build();

        router.handle("tg", text("buy")).await.unwrap();
        let question = tg.sent().pop().unwrap();
        assert!(question.keyboard.is_some());
        assert!(!question.remove_keyboard);

        router.handle("tg", text("3")).await.unwrap();
        let thanks = tg.sent().pop().unwrap();
        assert_eq!(thanks.message, "Thanks");
        assert!(thanks.remove_keyboard);

        let forwarded = ops.sent();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].peer_id, "admin");
        assert_eq!(forwarded[0].message, "New order\n\nHow many?>> 3\n\n");
    }

    #[tokio::test]
    async fn test_json_file_sessions_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let tg = Arc::new(MockAdapter::new("tg"));

        let storage = JsonFileSessionStorage::open(&path).await.unwrap();
        let router = builder(name_script(), &tg)
            .with_sessions(SessionManager::new(Arc::new(storage)))
            .build();
        router.handle("tg", text("hi")).await.unwrap();
        drop(router);

        let storage = JsonFileSessionStorage::open(&path).await.unwrap();
        let router = builder(name_script(), &tg)
            .with_sessions(SessionManager::new(Arc::new(storage)))
            .build();
        router.handle("tg", text("Alice")).await.unwrap();

        let stored = router.sessions().peek(&key()).await.unwrap().unwrap();
        assert_eq!(stored.answers["ask_name"][0].answer, json!("Alice"));
    }
}

//! Runtime integration tests — an interpreter-shaped scenario driving
//! all four components together.

use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

use storyloom::core::external::ExternalFunctions;
use storyloom::core::list::ListConfig;
use storyloom::core::passage::{PassageBinder, PassageCall};
use storyloom::core::registry::ListRegistry;
use storyloom::core::scheduler::{SchedulerConfig, StepOutcome, ThreadScheduler};
use storyloom::schema::thread::ThreadState;
use storyloom::schema::value::Value;

#[test]
fn concurrent_branches_drive_story_state() {
    let mut sched = ThreadScheduler::new(SchedulerConfig::default());
    let mut lists = ListRegistry::new(ListConfig::default());

    lists.define_exclusive("scene_mood", &["calm", "tense", "chaotic"], Some("calm"));
    lists.define_flags("clues", &["letter", "glass", "footprint"], &[]);

    let main = sched.create_thread("dinner_party").unwrap();
    let search = sched.spawn_thread("search_study", main, 5).unwrap();
    let gossip = sched.spawn_thread("overhear_gossip", main, 1).unwrap();

    // main waits for the high-priority search branch
    sched.await_thread(main, search).unwrap();

    // tick 1: search finds a clue and completes; gossip raises tension
    let lists_cell = RefCell::new(&mut lists);
    sched.step(|t| match t.passage.as_str() {
        "search_study" => {
            lists_cell.borrow_mut().add_value("clues", "letter");
            Ok(StepOutcome::Complete(Some(Value::from("letter"))))
        }
        "overhear_gossip" => {
            lists_cell.borrow_mut().set_value("scene_mood", "tense");
            Ok(StepOutcome::Complete(None))
        }
        _ => Ok(StepOutcome::Continue),
    });

    // search completion released main
    assert_eq!(sched.get_thread(main).unwrap().state, ThreadState::Running);
    assert_eq!(
        sched.get_thread(search).unwrap().result,
        Some(Value::from("letter"))
    );
    assert_eq!(sched.get_thread(gossip).unwrap().state, ThreadState::Completed);

    assert_eq!(lists.get_value("scene_mood"), Some("tense"));
    assert!(lists.has_value("clues", "letter"));

    // tick 2: main reacts to the gathered state and finishes
    let found_clues = lists.get_values("clues");
    sched.step(|_| {
        Ok(StepOutcome::Complete(Some(Value::from(
            found_clues.len() as i64
        ))))
    });
    assert!(sched.is_complete());
}

#[test]
fn passage_entry_with_host_calls() {
    // Host side: a typed achievement hook and a sound effect trigger.
    let unlocked = Rc::new(RefCell::new(Vec::new()));
    let mut fns = ExternalFunctions::new();
    let log = Rc::clone(&unlocked);
    fns.declare("unlock_achievement(id: string, quiet?: boolean)")
        .unwrap();
    fns.register("unlock_achievement", move |args| {
        if let Value::String(id) = &args[0] {
            log.borrow_mut().push(id.clone());
        }
        Ok(Value::Bool(true))
    });

    // Script side: a parameterized passage entered from a call site.
    let mut binder = PassageBinder::new();
    binder
        .register("Confront(accused, weapon='candlestick')")
        .unwrap();
    let call = PassageCall::parse("Confront($suspect)").unwrap();
    binder.validate_call(&call.target, call.args.len()).unwrap();
    let binding = binder.bind_call(&call).unwrap();

    let mut caller_vars = FxHashMap::default();
    caller_vars.insert("suspect".to_string(), Value::from("James"));
    let scope = binder.create_variable_scope(&binding, &caller_vars, |_| Ok(Value::Null));

    assert_eq!(scope.get("accused"), Some(&Value::from("James")));
    assert_eq!(scope.get("weapon"), Some(&Value::from("candlestick")));

    // The passage body calls the host function with its bound scope.
    let accused = scope.get("accused").cloned().unwrap_or(Value::Null);
    fns.call(
        "unlock_achievement",
        &[Value::from("first_confrontation"), Value::Bool(false)],
    )
    .unwrap();
    assert!(fns
        .call("unlock_achievement", &[accused, Value::from("oops")])
        .is_err()); // second arg must be a boolean
    assert_eq!(*unlocked.borrow(), vec!["first_confrontation"]);
}

#[test]
fn list_hooks_observe_thread_driven_transitions() {
    let mut sched = ThreadScheduler::new(SchedulerConfig::default());
    let mut lists = ListRegistry::new(ListConfig::default());
    lists.define_exclusive("act", &["one", "two", "three"], Some("one"));

    let entered = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&entered);
    lists
        .list_mut("act")
        .unwrap()
        .on_enter("two", Box::new(move |s| log.borrow_mut().push(s.to_string())));

    let main = sched.create_thread("act_one").unwrap();
    let lists_cell = RefCell::new(&mut lists);
    sched.step(|_| {
        lists_cell.borrow_mut().set_value("act", "two");
        Ok(StepOutcome::Continue)
    });

    assert_eq!(*entered.borrow(), vec!["two"]);
    assert_eq!(lists.get_value("act"), Some("two"));
    assert_eq!(sched.get_thread(main).unwrap().state, ThreadState::Running);
}

#[test]
fn executor_failure_is_contained_to_its_branch() {
    let mut sched = ThreadScheduler::new(SchedulerConfig::default());
    let main = sched.create_thread("story").unwrap();
    let flaky = sched.spawn_thread("flaky_minigame", main, 3).unwrap();

    sched.step(|t| {
        if t.passage == "flaky_minigame" {
            Err("division by zero in score calc".to_string())
        } else {
            Ok(StepOutcome::Continue)
        }
    });

    let t = sched.get_thread(flaky).unwrap();
    assert_eq!(t.state, ThreadState::Completed);
    assert!(matches!(
        t.result,
        Some(Value::String(ref m)) if m.contains("division by zero")
    ));
    // the main branch keeps running
    assert_eq!(sched.get_thread(main).unwrap().state, ThreadState::Running);
}

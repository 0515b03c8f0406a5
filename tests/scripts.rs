//! End-to-end macro scripts run through the public API against `MemoryHost`.
#![expect(clippy::unwrap_used)] // test code OK

use cadlisp::host::{CommandEvent, EntityStore, LogStyle, Point, Shape};
use cadlisp::lexer::{Token, tokenize};
use cadlisp::{Error, InputBroker, InputKind, Interpreter, MemoryHost, Step, Value};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::future::Future;
use std::pin::pin;
use std::task::{Context, Poll, Waker};

fn num(n: f64) -> Value {
    Value::Number(n)
}

fn sym(name: &str) -> Value {
    Value::Symbol(name.to_uppercase())
}

fn setup() -> (Interpreter, MemoryHost) {
    let host = MemoryHost::new();
    (Interpreter::new(host.clone()), host)
}

/// Run a script that never asks for input
fn run(interp: &mut Interpreter, source: &str) -> Value {
    match interp.execute(source).step() {
        Step::Finished(value) => value,
        other => panic!("{source:?} did not finish: {other:?}"),
    }
}

fn expect_request(step: Step, kind: InputKind) {
    match step {
        Step::AwaitingInput(request) => assert_eq!(request.kind, kind),
        other => panic!("expected a {kind} request, got {other:?}"),
    }
}

#[test]
fn tokenize_then_evaluate() {
    assert_eq!(
        tokenize("(+ 1 2 3)").unwrap(),
        vec![
            Token::LParen,
            Token::Symbol("+".into()),
            Token::Number(1.0),
            Token::Number(2.0),
            Token::Number(3.0),
            Token::RParen,
        ]
    );

    let (mut interp, _host) = setup();
    assert_eq!(run(&mut interp, "(+ 1 2 3)"), num(6.0));
}

#[test]
fn globals_persist_between_batches() {
    let (mut interp, _host) = setup();
    assert_eq!(run(&mut interp, "(setq x 10)"), num(10.0));
    assert_eq!(run(&mut interp, "x"), num(10.0));
    assert_eq!(
        run(
            &mut interp,
            "(setq i 0) (setq s 0) (while (< i 5) (setq s (+ s i)) (setq i (+ i 1))) s"
        ),
        num(10.0)
    );
    assert_eq!(run(&mut interp, "(defun sq (x) (* x x))"), sym("sq"));
    assert_eq!(run(&mut interp, "(sq 5)"), num(25.0));
}

#[test]
fn list_laws_hold() {
    let (mut interp, _host) = setup();
    run(&mut interp, "(setq l1 '(1 2 3) l2 '(a b))");
    assert_eq!(run(&mut interp, "(equal (car (cons 'z l1)) 'z)"), Value::True);
    assert_eq!(
        run(&mut interp, "(= (length (append l1 l2)) (+ (length l1) (length l2)))"),
        Value::True
    );
}

#[test]
fn error_stops_the_batch_and_is_logged() {
    let (mut interp, host) = setup();
    let value = run(&mut interp, "(setq before 1) (undefined-fn 2) (setq after 3)");
    assert_eq!(value, Value::Nil);
    assert_eq!(run(&mut interp, "(list before after)"), Value::List(vec![num(1.0), Value::Nil]));
    assert_eq!(
        host.drawing().output(LogStyle::Error),
        "Error: UnknownFunction: no function definition: UNDEFINED-FN"
    );
}

#[test]
fn circle_from_picked_center() {
    let (mut interp, host) = setup();
    let mut execution = interp.execute(
        r#"
        ; ask for a center, then draw a circle of radius 4 there
        (setq c (getpoint "Center: "))
        (entmake (list (list 0 "CIRCLE") (list 10 (car c)) (list 20 (cadr c)) (list 40 4)))
        (princ "done")
        "#,
    );

    expect_request(execution.step(), InputKind::Point);
    assert_eq!(
        execution.resolve_input(json!({"x": 5, "y": 7})),
        Step::Finished(Value::String("done".into()))
    );
    drop(execution);

    assert_eq!(
        interp.globals().get("C"),
        Some(&Value::List(vec![num(5.0), num(7.0), num(0.0)]))
    );
    let drawing = host.drawing();
    assert_eq!(drawing.entities.len(), 1);
    assert_eq!(
        drawing.entities[0].shape,
        Shape::Circle {
            center: Point::new(5.0, 7.0),
            radius: 4.0,
        }
    );
    assert_eq!(drawing.journal, vec!["checkpoint entmake", "add 1", "redraw"]);
    assert_eq!(drawing.output(LogStyle::Output), "done");
}

#[test]
fn polyline_from_a_pick_loop_until_cancel() {
    let (mut interp, host) = setup();
    let mut execution = interp.execute(
        r#"
        (setq pts nil)
        (while (setq p (getpoint "Next point: "))
          (setq pts (append pts (list (list 10 (car p)) (list 20 (cadr p))))))
        (entmake (append (list (list 0 "LWPOLYLINE") (list 70 1)) pts))
        (length pts)
        "#,
    );

    expect_request(execution.step(), InputKind::Point);
    expect_request(execution.resolve_input(json!([0, 0])), InputKind::Point);
    expect_request(execution.resolve_input(json!([10, 0])), InputKind::Point);
    expect_request(execution.resolve_input(json!([10, 5])), InputKind::Point);
    assert_eq!(execution.cancel_input(), Step::Finished(num(6.0)));
    drop(execution);

    assert_eq!(
        host.drawing().entities[0].shape,
        Shape::Polyline {
            vertices: vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 5.0),
            ],
            closed: true,
        }
    );
}

#[test]
fn move_selected_entities_to_a_layer() {
    let (mut interp, host) = setup();
    run(
        &mut interp,
        r#"(entmake (list (list 0 "LINE") (list 11 10)))
           (entmake (list (list 0 "TEXT") (list 1 "label")))"#,
    );

    let mut execution = interp.execute(
        r#"
        (setq ss (ssget) i 0)
        (repeat (sslength ss)
          (setq ent (entget (ssname ss i)))
          (entmod (subst (list 8 "NOTES") (assoc 8 ent) ent))
          (setq i (1+ i)))
        "#,
    );
    expect_request(execution.step(), InputKind::SsGet);
    assert_eq!(execution.resolve_input(json!([2])), Step::Finished(num(1.0)));
    drop(execution);

    let layers: Vec<String> = host
        .ids()
        .into_iter()
        .filter_map(|id| host.get(id))
        .map(|entity| entity.layer)
        .collect();
    assert_eq!(layers, vec!["0", "NOTES"]);
    assert_eq!(host.drawing().checkpoints, vec!["entmake", "entmake", "entmod"]);
}

#[test]
fn mapcar_over_interactive_closure() {
    let (mut interp, _host) = setup();
    let mut execution = interp.execute("(mapcar (lambda (n) (+ n (getreal))) '(1 2 3))");
    expect_request(execution.step(), InputKind::Real);
    expect_request(execution.resolve_input(json!(10)), InputKind::Real);
    expect_request(execution.resolve_input(json!(20)), InputKind::Real);
    assert_eq!(
        execution.resolve_input(json!(30)),
        Step::Finished(Value::List(vec![num(11.0), num(22.0), num(33.0)]))
    );
}

#[test]
fn commands_are_driven_step_by_step() {
    let (mut interp, host) = setup();
    let mut execution = interp.execute(
        r#"(setq a (getpoint) b (getpoint a))
           (command "_LINE" a b "")"#,
    );
    expect_request(execution.step(), InputKind::Point);
    expect_request(execution.resolve_input(json!([1, 1])), InputKind::Point);
    assert_eq!(execution.resolve_input(json!("4,5")), Step::Finished(Value::Nil));
    drop(execution);

    // "4,5" is not a point answer, so b is nil and is sent as an empty input
    assert_eq!(
        host.drawing().commands,
        vec![
            CommandEvent::Start("LINE".into()),
            CommandEvent::Settle,
            CommandEvent::Click(Point::new(1.0, 1.0)),
            CommandEvent::Settle,
            CommandEvent::Input(String::new()),
            CommandEvent::Settle,
            CommandEvent::Input(String::new()),
            CommandEvent::Settle,
        ]
    );
    assert_eq!(host.drawing().redraws, 1);
    assert_eq!(host.drawing().checkpoints, vec!["LINE"]);
}

#[test]
fn deleting_twice_reports_a_host_error() {
    let (mut interp, host) = setup();
    let value = run(
        &mut interp,
        r#"(entmake (list (list 0 "LINE")))
           (setq e (entlast))
           (entdel e)
           (entdel e)
           (setq after 1)"#,
    );
    assert_eq!(value, Value::Nil);
    assert_eq!(run(&mut interp, "after"), Value::Nil);
    assert_eq!(
        host.drawing().output(LogStyle::Error),
        "Error: HostBridgeError: entdel: entity 1 does not exist"
    );
    assert_eq!(host.drawing().checkpoints, vec!["entmake", "entdel"]);
}

#[test]
fn malformed_defun_is_a_syntax_error() {
    let (mut interp, host) = setup();
    assert_eq!(run(&mut interp, "(defun f)"), Value::Nil);
    assert!(
        host.drawing()
            .output(LogStyle::Error)
            .starts_with("Error: SyntaxError: malformed defun")
    );
}

#[test_log::test]
fn dropped_execution_leaves_no_pending_request() {
    let (mut interp, _host) = setup();
    let broker = interp.broker().clone();
    {
        let mut execution = interp.execute("(getdist)");
        expect_request(execution.step(), InputKind::Dist);
        assert!(broker.is_pending());
    }
    assert!(!broker.is_pending());
    assert_eq!(run(&mut interp, "(* 6 7)"), num(42.0));
}

#[test]
fn resolution_order_and_closure_snapshots() {
    let (mut interp, _host) = setup();
    assert!(matches!(
        run(&mut interp, "(setq n 1) (setq f (lambda () n))"),
        Value::Closure(_)
    ));

    let cases = [
        ("(if T 1 2)", num(1.0)),
        ("(if nil 1 2)", num(2.0)),
        ("(if nil 1)", Value::Nil),
        ("(setq n 2)", num(2.0)),
        ("(f)", num(1.0)),
        ("(defun + (a b) 999)", sym("+")),
        ("(+ 2 3)", num(5.0)),
    ];
    for (source, expected) in cases {
        assert_eq!(run(&mut interp, source), expected, "{source}");
    }
}

#[test_log::test]
fn newer_request_orphans_the_older_one() {
    let broker = InputBroker::new();
    let mut cx = Context::from_waker(Waker::noop());

    let mut first = pin!(broker.request(InputKind::Point, "First: ", None));
    let mut second = pin!(broker.request(InputKind::Real, "Second: ", None));

    assert!(matches!(
        first.as_mut().poll(&mut cx),
        Poll::Ready(Err(Error::InputOrphaned(_)))
    ));
    assert_eq!(broker.pending().unwrap().prompt, "Second: ");

    broker.resolve(json!(2.5));
    assert!(matches!(second.as_mut().poll(&mut cx), Poll::Ready(Ok(Value::Number(n))) if n == 2.5));
    assert!(!broker.is_pending());
}

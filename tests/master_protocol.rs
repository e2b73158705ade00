//! Drives the master's handlers directly and observes the write queue,
//! the way the real event loop would.

use crossbeam_channel::{unbounded, Receiver};
use lsp_server::{Message, Notification, Request, RequestId, Response};
use sigil::server::master::Master;
use sigil::server::{
    Dest, SendMessageJob, TypecheckUpdateParams, WorkerId, TYPECHECK_METHOD,
    TYPECHECK_START_METHOD, TYPECHECK_UPDATE_METHOD,
};

fn new_master(
    check_workers: usize,
    threshold: usize,
    work_done_progress: bool,
) -> (Master, Receiver<SendMessageJob>) {
    let (tx, rx) = unbounded();
    let mut master = Master::new(check_workers, threshold, tx);
    let params = serde_json::json!({
        "capabilities": { "window": { "workDoneProgress": work_done_progress } }
    });
    master.handle_client_message(Message::Request(Request::new(
        RequestId::from(9000),
        "initialize".to_string(),
        params,
    )));
    // Swallow the handshake traffic (worker broadcasts + the reply).
    drain(&rx);
    (master, rx)
}

fn drain(rx: &Receiver<SendMessageJob>) -> Vec<SendMessageJob> {
    rx.try_iter().collect()
}

fn did_change(master: &mut Master, uri: &str) {
    let params = serde_json::json!({
        "textDocument": { "uri": uri, "version": 2 },
        "contentChanges": [{ "text": "let x: Integer = 1\n" }],
    });
    master.handle_client_message(Message::Notification(Notification::new(
        "textDocument/didChange".to_string(),
        params,
    )));
}

fn typecheck_request(master: &mut Master, id: i32) {
    master.handle_client_message(Message::Request(Request::new(
        RequestId::from(id),
        TYPECHECK_METHOD.to_string(),
        serde_json::json!({}),
    )));
}

fn update(master: &mut Master, worker: usize, guid: &str, path: &str) {
    master.handle_worker_message(
        WorkerId::Check(worker),
        Message::Notification(Notification::new(
            TYPECHECK_UPDATE_METHOD.to_string(),
            serde_json::to_value(TypecheckUpdateParams {
                guid: guid.to_string(),
                path: path.into(),
            })
            .unwrap(),
        )),
    );
}

fn method_of(job: &SendMessageJob) -> Option<&str> {
    match &job.message {
        Message::Request(r) => Some(r.method.as_str()),
        Message::Notification(n) => Some(n.method.as_str()),
        Message::Response(_) => None,
    }
}

fn progress_kind_and_percentage(job: &SendMessageJob) -> (String, Option<u64>) {
    let Message::Notification(n) = &job.message else {
        panic!("expected a notification, got {:?}", job.message);
    };
    assert_eq!(n.method, "$/progress");
    let value = &n.params["value"];
    (
        value["kind"].as_str().unwrap().to_string(),
        value["percentage"].as_u64(),
    )
}

fn start_guid(job: &SendMessageJob) -> String {
    let Message::Notification(n) = &job.message else {
        panic!("expected a notification");
    };
    assert_eq!(n.method, TYPECHECK_START_METHOD);
    n.params["guid"].as_str().unwrap().to_string()
}

fn start_paths(job: &SendMessageJob) -> Vec<String> {
    let Message::Notification(n) = &job.message else {
        panic!("expected a notification");
    };
    n.params["paths"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p.as_str().unwrap().to_string())
        .collect()
}

#[test]
fn progress_sequence_with_capability() {
    let (mut master, rx) = new_master(1, 2, true);

    did_change(&mut master, "file:///src/a.sgl");
    did_change(&mut master, "file:///src/b.sgl");
    drain(&rx);

    typecheck_request(&mut master, 1);
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 3, "create, begin, start: {jobs:?}");

    assert_eq!(jobs[0].dest, Dest::Client);
    assert_eq!(method_of(&jobs[0]), Some("window/workDoneProgress/create"));

    assert_eq!(jobs[1].dest, Dest::Client);
    assert_eq!(progress_kind_and_percentage(&jobs[1]), ("begin".to_string(), Some(0)));

    assert_eq!(jobs[2].dest, Dest::Worker(WorkerId::Check(0)));
    let guid = start_guid(&jobs[2]);
    assert_eq!(start_paths(&jobs[2]), vec!["/src/a.sgl", "/src/b.sgl"]);

    update(&mut master, 0, &guid, "/src/a.sgl");
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    assert_eq!(progress_kind_and_percentage(&jobs[0]), ("report".to_string(), Some(50)));

    update(&mut master, 0, &guid, "/src/b.sgl");
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 3, "report, end, response: {jobs:?}");
    assert_eq!(progress_kind_and_percentage(&jobs[0]), ("report".to_string(), Some(100)));
    assert_eq!(progress_kind_and_percentage(&jobs[1]), ("end".to_string(), None));
    let Message::Response(resp) = &jobs[2].message else {
        panic!("expected the batch response");
    };
    assert_eq!(resp.id, RequestId::from(1));
    assert_eq!(resp.result.as_ref().unwrap()["guid"].as_str().unwrap(), guid);
}

#[test]
fn progress_suppressed_below_threshold() {
    let (mut master, rx) = new_master(1, 10, true);

    did_change(&mut master, "file:///src/a.sgl");
    did_change(&mut master, "file:///src/b.sgl");
    drain(&rx);

    typecheck_request(&mut master, 1);
    let jobs = drain(&rx);
    // Work is still dispatched, with no progress traffic around it.
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].dest, Dest::Worker(WorkerId::Check(0)));
    let guid = start_guid(&jobs[0]);

    update(&mut master, 0, &guid, "/src/a.sgl");
    assert!(drain(&rx).is_empty());

    update(&mut master, 0, &guid, "/src/b.sgl");
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    let Message::Response(resp) = &jobs[0].message else {
        panic!("expected the batch response");
    };
    assert_eq!(resp.id, RequestId::from(1));
}

#[test]
fn progress_without_capability_is_silent() {
    let (mut master, rx) = new_master(1, 0, false);
    did_change(&mut master, "file:///src/a.sgl");
    drain(&rx);

    typecheck_request(&mut master, 1);
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    assert_eq!(method_of(&jobs[0]), Some(TYPECHECK_START_METHOD));
}

#[test]
fn stale_guid_updates_are_dropped() {
    let (mut master, rx) = new_master(1, 100, true);
    did_change(&mut master, "file:///src/a.sgl");
    drain(&rx);
    typecheck_request(&mut master, 1);
    let jobs = drain(&rx);
    let _guid = start_guid(&jobs[0]);

    update(&mut master, 0, "some-other-guid", "/src/a.sgl");
    assert!(drain(&rx).is_empty(), "stale updates produce nothing");
}

#[test]
fn out_of_assignment_paths_do_not_advance_progress() {
    let (mut master, rx) = new_master(1, 100, false);
    did_change(&mut master, "file:///src/a.sgl");
    drain(&rx);
    typecheck_request(&mut master, 1);
    let guid = start_guid(&drain(&rx)[0]);

    update(&mut master, 0, &guid, "/src/unrelated.sgl");
    assert!(drain(&rx).is_empty());

    update(&mut master, 0, &guid, "/src/a.sgl");
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1, "batch completes only on the real path");
}

#[test]
fn signature_edits_route_to_the_signature_worker() {
    let (mut master, rx) = new_master(2, 0, true);
    did_change(&mut master, "file:///sig/types.sig");
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1, "no check-worker forwards: {jobs:?}");
    assert_eq!(jobs[0].dest, Dest::Worker(WorkerId::Signature));

    // Signature edits do not dirty the batch set.
    typecheck_request(&mut master, 5);
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    assert!(matches!(jobs[0].message, Message::Response(_)));
}

#[test]
fn code_edits_route_to_check_workers() {
    let (mut master, rx) = new_master(2, 100, false);
    did_change(&mut master, "file:///src/main.sgl");
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 2, "one forward per check worker: {jobs:?}");
    assert!(jobs
        .iter()
        .all(|job| matches!(job.dest, Dest::Worker(WorkerId::Check(_)))));

    typecheck_request(&mut master, 6);
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    assert_eq!(method_of(&jobs[0]), Some(TYPECHECK_START_METHOD));
    assert_eq!(start_paths(&jobs[0]), vec!["/src/main.sgl"]);
}

#[test]
fn empty_batch_responds_immediately() {
    let (mut master, rx) = new_master(1, 0, true);
    typecheck_request(&mut master, 7);
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    let Message::Response(resp) = &jobs[0].message else {
        panic!("expected an immediate response");
    };
    assert_eq!(resp.id, RequestId::from(7));
    assert!(resp.result.as_ref().unwrap()["guid"].is_null());
}

#[test]
fn untitled_hover_short_circuits() {
    let (mut master, rx) = new_master(1, 0, true);
    let params = serde_json::json!({
        "textDocument": { "uri": "untitled:Untitled-1" },
        "position": { "line": 0, "character": 0 },
    });
    master.handle_client_message(Message::Request(Request::new(
        RequestId::from(3),
        "textDocument/hover".to_string(),
        params,
    )));

    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].dest, Dest::Client, "no worker round-trip");
    let Message::Response(resp) = &jobs[0].message else {
        panic!("expected a response");
    };
    assert_eq!(resp.id, RequestId::from(3));
    assert!(resp.result.as_ref().unwrap().is_null());
}

#[test]
fn untitled_definition_returns_empty_array() {
    let (mut master, rx) = new_master(1, 0, true);
    let params = serde_json::json!({
        "textDocument": { "uri": "untitled:Untitled-1" },
        "position": { "line": 0, "character": 0 },
    });
    master.handle_client_message(Message::Request(Request::new(
        RequestId::from(4),
        "textDocument/definition".to_string(),
        params,
    )));

    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    let Message::Response(resp) = &jobs[0].message else {
        panic!("expected a response");
    };
    assert_eq!(resp.result, Some(serde_json::json!([])));
}

#[test]
fn untitled_documents_never_reach_workers() {
    let (mut master, rx) = new_master(2, 0, true);
    let open = serde_json::json!({
        "textDocument": {
            "uri": "untitled:Untitled-1",
            "languageId": "sigil",
            "version": 1,
            "text": "class Foo < Object\nend\n",
        }
    });
    master.handle_client_message(Message::Notification(Notification::new(
        "textDocument/didOpen".to_string(),
        open,
    )));
    did_change(&mut master, "untitled:Untitled-1");
    assert!(drain(&rx).is_empty(), "untitled edits are dropped silently");

    // Nothing accumulated in the controller either.
    typecheck_request(&mut master, 9);
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    assert!(matches!(jobs[0].message, Message::Response(_)));
}

#[test]
fn hover_round_trip_is_correlated() {
    let (mut master, rx) = new_master(1, 0, true);
    let params = serde_json::json!({
        "textDocument": { "uri": "file:///src/a.sgl" },
        "position": { "line": 0, "character": 3 },
    });
    master.handle_client_message(Message::Request(Request::new(
        RequestId::from(41),
        "textDocument/hover".to_string(),
        params,
    )));

    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].dest, Dest::Worker(WorkerId::Interaction));
    let Message::Request(forwarded) = &jobs[0].message else {
        panic!("expected the forwarded request");
    };
    let outgoing = forwarded.id.clone();
    assert_ne!(outgoing, RequestId::from(41), "master rewrites request ids");

    master.handle_worker_message(
        WorkerId::Interaction,
        Message::Response(Response::new_ok(outgoing, serde_json::json!({ "contents": [] }))),
    );
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    let Message::Response(resp) = &jobs[0].message else {
        panic!("expected the client response");
    };
    assert_eq!(resp.id, RequestId::from(41));
}

#[test]
fn cancelled_interaction_response_is_dropped() {
    let (mut master, rx) = new_master(1, 0, true);
    let params = serde_json::json!({
        "textDocument": { "uri": "file:///src/a.sgl" },
        "position": { "line": 0, "character": 3 },
    });
    master.handle_client_message(Message::Request(Request::new(
        RequestId::from(42),
        "textDocument/hover".to_string(),
        params,
    )));
    let jobs = drain(&rx);
    let Message::Request(forwarded) = &jobs[0].message else {
        panic!("expected the forwarded request");
    };
    let outgoing = forwarded.id.clone();

    master.handle_client_message(Message::Notification(Notification::new(
        "$/cancelRequest".to_string(),
        serde_json::json!({ "id": 42 }),
    )));
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].dest, Dest::Worker(WorkerId::Interaction));
    assert_eq!(method_of(&jobs[0]), Some("$/cancelRequest"));

    master.handle_worker_message(
        WorkerId::Interaction,
        Message::Response(Response::new_ok(outgoing, serde_json::Value::Null)),
    );
    assert!(drain(&rx).is_empty(), "response for a cancelled id is dropped");
}

#[test]
fn workspace_symbols_aggregate_across_workers() {
    let (mut master, rx) = new_master(2, 0, true);
    master.handle_client_message(Message::Request(Request::new(
        RequestId::from(50),
        "workspace/symbol".to_string(),
        serde_json::json!({ "query": "Foo" }),
    )));

    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 2);
    let ids: Vec<RequestId> = jobs
        .iter()
        .map(|job| match &job.message {
            Message::Request(r) => r.id.clone(),
            other => panic!("expected a request, got {other:?}"),
        })
        .collect();

    master.handle_worker_message(
        WorkerId::Check(0),
        Message::Response(Response::new_ok(
            ids[0].clone(),
            serde_json::json!([{ "name": "Foo" }]),
        )),
    );
    assert!(drain(&rx).is_empty(), "waits for every worker");

    master.handle_worker_message(
        WorkerId::Check(1),
        Message::Response(Response::new_ok(
            ids[1].clone(),
            serde_json::json!([{ "name": "FooBar" }]),
        )),
    );
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    let Message::Response(resp) = &jobs[0].message else {
        panic!("expected the aggregated response");
    };
    assert_eq!(resp.id, RequestId::from(50));
    assert_eq!(resp.result.as_ref().unwrap().as_array().unwrap().len(), 2);
}

#[test]
fn dead_worker_assignment_is_requeued() {
    let (mut master, rx) = new_master(2, 100, false);
    for i in 0..6 {
        did_change(&mut master, &format!("file:///src/file{i}.sgl"));
    }
    drain(&rx);
    typecheck_request(&mut master, 60);
    let jobs = drain(&rx);

    let mut worker0_paths = Vec::new();
    let mut guid = String::new();
    let mut worker1_original = Vec::new();
    for job in &jobs {
        match job.dest {
            Dest::Worker(WorkerId::Check(0)) => {
                worker0_paths = start_paths(job);
                guid = start_guid(job);
            }
            Dest::Worker(WorkerId::Check(1)) => {
                worker1_original = start_paths(job);
                guid = start_guid(job);
            }
            _ => {}
        }
    }
    assert_eq!(worker0_paths.len() + worker1_original.len(), 6);

    master.handle_worker_exit(WorkerId::Check(0));
    let jobs = drain(&rx);
    let mut requeued = Vec::new();
    for job in &jobs {
        assert_eq!(job.dest, Dest::Worker(WorkerId::Check(1)), "only survivor gets work");
        assert_eq!(start_guid(job), guid);
        requeued.extend(start_paths(job));
    }
    let mut all: Vec<String> = worker1_original.iter().cloned().chain(requeued.clone()).collect();
    all.sort();
    let mut expected: Vec<String> = (0..6).map(|i| format!("/src/file{i}.sgl")).collect();
    expected.sort();
    assert_eq!(all, expected, "every path is still owned by someone");

    // The batch still completes through the survivor.
    for path in worker1_original.iter().chain(requeued.iter()) {
        update(&mut master, 1, &guid, path);
    }
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    let Message::Response(resp) = &jobs[0].message else {
        panic!("expected the batch response");
    };
    assert_eq!(resp.id, RequestId::from(60));
}

#[test]
fn last_worker_death_is_fatal() {
    let (mut master, rx) = new_master(1, 100, false);
    did_change(&mut master, "file:///src/a.sgl");
    drain(&rx);
    typecheck_request(&mut master, 70);
    drain(&rx);

    master.handle_worker_exit(WorkerId::Check(0));
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    assert_eq!(method_of(&jobs[0]), Some("window/showMessage"));
    assert!(master.is_fatal());
    assert!(master.should_exit());
}

#[test]
fn worker_error_message_sets_the_fatal_flag() {
    let (mut master, rx) = new_master(1, 0, true);
    master.handle_worker_message(
        WorkerId::Check(0),
        Message::Notification(Notification::new(
            "window/showMessage".to_string(),
            serde_json::json!({ "type": 1, "message": "store invariant violated" }),
        )),
    );
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].dest, Dest::Client, "forwarded to the client");
    assert!(master.is_fatal());
}

#[test]
fn diagnostics_are_forwarded_verbatim() {
    let (mut master, rx) = new_master(1, 0, true);
    let params = serde_json::json!({
        "uri": "file:///src/a.sgl",
        "diagnostics": [{ "range": { "start": { "line": 0, "character": 0 },
                                     "end": { "line": 0, "character": 3 } },
                          "message": "unknown type name 'Foo'" }],
    });
    master.handle_worker_message(
        WorkerId::Check(0),
        Message::Notification(Notification::new(
            "textDocument/publishDiagnostics".to_string(),
            params.clone(),
        )),
    );
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].dest, Dest::Client);
    let Message::Notification(n) = &jobs[0].message else {
        panic!("expected a notification");
    };
    assert_eq!(n.params, params);
}

#[test]
fn shutdown_waits_for_all_workers() {
    let (mut master, rx) = new_master(2, 0, true);
    master.handle_client_message(Message::Request(Request::new(
        RequestId::from(80),
        "shutdown".to_string(),
        serde_json::Value::Null,
    )));

    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 4, "interaction, signature, two check workers");
    let ids: Vec<RequestId> = jobs
        .iter()
        .map(|job| match &job.message {
            Message::Request(r) => r.id.clone(),
            other => panic!("expected a request, got {other:?}"),
        })
        .collect();

    for (i, id) in ids.iter().enumerate() {
        let source = match i {
            0 => WorkerId::Interaction,
            1 => WorkerId::Signature,
            2 => WorkerId::Check(0),
            _ => WorkerId::Check(1),
        };
        master.handle_worker_message(
            source,
            Message::Response(Response::new_ok(id.clone(), serde_json::Value::Null)),
        );
        if i + 1 < ids.len() {
            assert!(drain(&rx).is_empty(), "no reply before every ack");
        }
    }
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    let Message::Response(resp) = &jobs[0].message else {
        panic!("expected the shutdown response");
    };
    assert_eq!(resp.id, RequestId::from(80));

    master.handle_client_message(Message::Notification(Notification::new(
        "exit".to_string(),
        serde_json::Value::Null,
    )));
    assert!(master.should_exit());
    let exits = drain(&rx);
    assert_eq!(exits.len(), 4, "exit broadcast to every worker");
}

#[test]
fn new_batch_supersedes_and_carries_over() {
    let (mut master, rx) = new_master(1, 100, false);
    did_change(&mut master, "file:///src/a.sgl");
    did_change(&mut master, "file:///src/b.sgl");
    drain(&rx);
    typecheck_request(&mut master, 90);
    let first = drain(&rx);
    let first_guid = start_guid(&first[0]);

    update(&mut master, 0, &first_guid, "/src/a.sgl");
    drain(&rx);

    // A second request before completion replaces the first; the
    // unfinished path rides along.
    typecheck_request(&mut master, 91);
    let jobs = drain(&rx);
    let second_guid = start_guid(&jobs[0]);
    assert_ne!(first_guid, second_guid);
    assert_eq!(start_paths(&jobs[0]), vec!["/src/b.sgl"]);

    // Updates against the old guid no longer count.
    update(&mut master, 0, &first_guid, "/src/b.sgl");
    assert!(drain(&rx).is_empty());

    update(&mut master, 0, &second_guid, "/src/b.sgl");
    let jobs = drain(&rx);
    assert_eq!(jobs.len(), 1);
    let Message::Response(resp) = &jobs[0].message else {
        panic!("expected the second batch's response");
    };
    assert_eq!(resp.id, RequestId::from(91));
}

use docchat::{
    docchat_test::{MockChatTransport, MockRetriever, MockStreamResult, TrackedSearch},
    CancellationToken, ChatError, ChatEvent, ChatSession, ChatSessionOptions, ContextArtifact,
    MessageContent, Part, RetrievalError, Role, SendOutcome, StreamError, StreamErrorKind,
};
use std::{sync::Arc, time::Duration};

struct Harness {
    session: ChatSession,
    retriever: Arc<MockRetriever>,
    transport: Arc<MockChatTransport>,
}

fn harness() -> Harness {
    let retriever = Arc::new(MockRetriever::new());
    let transport = Arc::new(MockChatTransport::new());
    let session = ChatSession::new(
        retriever.clone(),
        transport.clone(),
        ChatSessionOptions {
            system_prompt: "Be helpful.".to_string(),
            error_message: "Something went wrong.".to_string(),
            ..ChatSessionOptions::default()
        },
    );
    Harness {
        session,
        retriever,
        transport,
    }
}

fn page(id: &str) -> ContextArtifact {
    ContextArtifact::new(id, format!("{id}-data"), "image/jpeg")
}

#[tokio::test]
async fn plain_message_streams_into_one_assistant_reply() {
    let Harness {
        mut session,
        transport,
        ..
    } = harness();
    transport.enqueue(MockStreamResult::tokens(["Hel", "lo"]));

    let outcome = session
        .send("What is the weather?")
        .await
        .expect("send should be accepted");

    assert!(matches!(outcome, SendOutcome::Completed { tokens: 2 }));
    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(
        messages[1].content,
        MessageContent::Text("What is the weather?".to_string())
    );
    assert_eq!(messages[2].role, Role::Assistant);
    assert_eq!(messages[2].text(), "Hello");
    assert!(!messages[2].is_streaming);
    assert!(!messages[2].is_incomplete);
    assert!(!session.is_processing());

    let requests = transport.tracked_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].len(), 2);
    assert_eq!(requests[0][0].role, Role::System);
    assert_eq!(transport.released_streams(), 1);
}

#[tokio::test]
async fn directive_with_text_sends_annotated_message_with_pages() {
    let Harness {
        mut session,
        retriever,
        transport,
    } = harness();
    retriever.enqueue(vec![page("p1"), page("p2")]);
    transport.enqueue(MockStreamResult::tokens(["Revenue grew."]));

    session
        .send(r#"@document "revenue 2023" show me the numbers"#)
        .await
        .expect("send should be accepted");

    assert_eq!(
        retriever.tracked_searches(),
        vec![TrackedSearch {
            query: "revenue 2023".to_string(),
            page_budget: 3,
        }]
    );

    let user = &session.messages()[1];
    let MessageContent::Parts(parts) = &user.content else {
        panic!("expected part content, got {:?}", user.content);
    };
    assert_eq!(
        parts,
        &vec![
            Part::text(r#"[Context: Searched documents for "revenue 2023"] show me the numbers"#),
            Part::image("p1-data", "image/jpeg"),
            Part::image("p2-data", "image/jpeg"),
        ]
    );
    assert!(session.context().is_empty());
    assert_eq!(session.messages()[2].text(), "Revenue grew.");
}

#[tokio::test]
async fn directive_only_input_fills_context_for_the_next_send() {
    let Harness {
        mut session,
        retriever,
        transport,
    } = harness();
    retriever.enqueue(vec![page("p1"), page("p2")]);
    transport.enqueue(MockStreamResult::tokens(["ok"]));

    let outcome = session
        .send(r#"@document "xyzzy""#)
        .await
        .expect("directive-only input is accepted");

    assert!(matches!(outcome, SendOutcome::ContextOnly { context: 2 }));
    assert_eq!(session.messages().len(), 1);
    assert!(transport.tracked_requests().is_empty());

    session.send("compare them").await.expect("send");

    let user = &session.messages()[1];
    assert_eq!(user.text(), "compare them");
    assert_eq!(user.content.images().len(), 2);
    assert!(session.context().is_empty());
}

#[tokio::test]
async fn directive_only_input_without_hits_sends_nothing() {
    let Harness {
        mut session,
        retriever,
        transport,
    } = harness();
    retriever.enqueue(Vec::<ContextArtifact>::new());

    let outcome = session
        .send(r#"@document "xyzzy""#)
        .await
        .expect("directive-only input is accepted");

    assert!(matches!(outcome, SendOutcome::ContextOnly { context: 0 }));
    assert_eq!(session.messages().len(), 1);
    assert!(session.context().is_empty());
    assert!(transport.tracked_requests().is_empty());
}

#[tokio::test]
async fn enter_on_an_open_quote_closes_it() {
    let Harness {
        mut session,
        retriever,
        ..
    } = harness();
    retriever.enqueue(vec![page("p1")]);

    let outcome = session
        .send(r#"@document "revenue"#)
        .await
        .expect("partial directive is completed");

    assert!(matches!(outcome, SendOutcome::ContextOnly { context: 1 }));
    assert_eq!(retriever.tracked_searches()[0].query, "revenue");
}

#[tokio::test]
async fn empty_open_quote_is_sent_as_typed() {
    let Harness {
        mut session,
        retriever,
        transport,
    } = harness();
    transport.enqueue(MockStreamResult::tokens(["ok"]));

    let outcome = session
        .send(r#"@document ""#)
        .await
        .expect("literal input is sent");

    assert!(matches!(outcome, SendOutcome::Completed { .. }));
    assert!(retriever.tracked_searches().is_empty());
    let requests = transport.tracked_requests();
    assert_eq!(
        requests[0].last().map(docchat::Message::text),
        Some(r#"@document ""#.to_string())
    );
}

#[tokio::test]
async fn empty_input_is_rejected() {
    let Harness { mut session, .. } = harness();

    let error = session.send("   ").await.expect_err("empty input");

    assert!(matches!(error, ChatError::InvalidInput(_)));
    assert_eq!(session.messages().len(), 1);
}

#[tokio::test]
async fn retrieval_failure_rejects_the_send_untouched() {
    let Harness {
        mut session,
        retriever,
        transport,
    } = harness();
    session.attach(vec![page("picked")]);
    retriever.enqueue(RetrievalError::ServerRejected {
        status: 503,
        message: "index offline".to_string(),
    });

    let error = session
        .send(r#"@document "revenue" what happened?"#)
        .await
        .expect_err("retrieval failure rejects the send");

    assert!(matches!(error, ChatError::Retrieval(_)));
    assert_eq!(session.messages().len(), 1);
    assert!(session.context().contains("picked"));
    assert!(transport.tracked_requests().is_empty());
    assert!(session
        .last_error()
        .is_some_and(|e| e.contains("index offline")));
    assert!(!session.is_processing());
}

#[tokio::test]
async fn mid_stream_failure_appends_exactly_one_error_message() {
    let Harness {
        mut session,
        transport,
        ..
    } = harness();
    transport.enqueue(MockStreamResult::Items(vec![
        Ok("Par".to_string()),
        Err(StreamError::ServerSignaled("model overloaded".to_string())),
    ]));

    let outcome = session.send("Hi").await.expect("send");

    let SendOutcome::Failed { error } = outcome else {
        panic!("expected a failed send");
    };
    assert_eq!(error.kind(), StreamErrorKind::ServerSignaled);

    let messages = session.messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[2].text(), "Par");
    assert!(messages[2].is_incomplete);
    assert_eq!(messages.iter().filter(|m| m.is_error).count(), 1);
    assert_eq!(messages[3].text(), "Something went wrong.");
    assert!(!session.is_processing());
    assert!(session.last_error().is_some());
    assert_eq!(transport.released_streams(), 1);
}

#[tokio::test]
async fn rejected_open_fails_the_send() {
    let Harness {
        mut session,
        transport,
        ..
    } = harness();
    transport.enqueue(StreamError::Status {
        status: 500,
        message: "Internal Server Error".to_string(),
    });

    let outcome = session.send("Hi").await.expect("send");

    assert!(matches!(outcome, SendOutcome::Failed { .. }));
    assert!(session.messages().last().is_some_and(|m| m.is_error));
    assert!(!session.is_processing());
    assert_eq!(transport.released_streams(), 0);
}

#[tokio::test]
async fn error_messages_are_not_sent_back() {
    let Harness {
        mut session,
        transport,
        ..
    } = harness();
    transport.enqueue(StreamError::Network("connection refused".to_string()));
    transport.enqueue(MockStreamResult::tokens(["Hello"]));

    session.send("first").await.expect("send");
    session.send("second").await.expect("send");

    let requests = transport.tracked_requests();
    let second = &requests[1];
    assert_eq!(second.len(), 3);
    assert!(second.iter().all(|m| !m.is_error && !m.is_streaming));
    assert!(second.iter().all(|m| m.role != Role::Assistant));
    assert_eq!(
        second.last().map(docchat::Message::text),
        Some("second".to_string())
    );
}

#[tokio::test]
async fn cancel_before_any_token_keeps_an_empty_incomplete_reply() {
    let Harness {
        mut session,
        transport,
        ..
    } = harness();
    transport.enqueue(MockStreamResult::Stalled(vec!["never".to_string()]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = session.send_with_cancel("Hi", cancel).await.expect("send");

    assert!(matches!(outcome, SendOutcome::Cancelled { tokens: 0 }));
    let reply = session.messages().last().expect("reply");
    assert_eq!(reply.role, Role::Assistant);
    assert!(reply.is_incomplete);
    assert!(!reply.is_error);
    assert_eq!(transport.released_streams(), 1);
}

#[tokio::test]
async fn cancel_mid_stream_keeps_partial_content() {
    let Harness {
        mut session,
        transport,
        ..
    } = harness();
    transport.enqueue(MockStreamResult::Stalled(vec![
        "Hel".to_string(),
        "lo".to_string(),
    ]));
    let mut events = session.subscribe();
    let cancel = CancellationToken::new();

    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let mut deltas = 0;
            while let Some(event) = events.recv().await {
                if let ChatEvent::Delta { .. } = event {
                    deltas += 1;
                    if deltas == 2 {
                        cancel.cancel();
                    }
                }
            }
            deltas
        }
    });

    let outcome = session
        .send_with_cancel("Hi", cancel)
        .await
        .expect("send");

    assert!(matches!(outcome, SendOutcome::Cancelled { tokens: 2 }));
    let reply = session.messages().last().expect("reply");
    assert_eq!(reply.text(), "Hello");
    assert!(reply.is_incomplete);
    assert!(!session.messages().iter().any(|m| m.is_error));
    assert!(!session.is_processing());
    assert_eq!(transport.released_streams(), 1);

    drop(session);
    assert_eq!(watcher.await.expect("watcher task"), 2);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_send_future_finalizes_the_reply() {
    let Harness {
        mut session,
        transport,
        ..
    } = harness();
    transport.enqueue(MockStreamResult::Stalled(vec!["Par".to_string()]));
    transport.enqueue(MockStreamResult::tokens(["again"]));
    let mut events = session.subscribe();

    let timed_out = tokio::time::timeout(Duration::from_millis(50), session.send("Hi")).await;
    assert!(timed_out.is_err());

    assert!(!session.is_processing());
    let reply = session.messages().last().expect("reply");
    assert_eq!(reply.text(), "Par");
    assert!(!reply.is_streaming);
    assert!(reply.is_incomplete);
    assert!(!session.messages().iter().any(|m| m.is_error));
    assert_eq!(transport.released_streams(), 1);

    let mut last_event = None;
    while let Ok(event) = events.try_recv() {
        last_event = Some(event);
    }
    assert_eq!(last_event, Some(ChatEvent::Cancelled));

    let outcome = session.send("again").await.expect("next send is accepted");
    assert!(matches!(outcome, SendOutcome::Completed { tokens: 1 }));
    session.reset().expect("reset after a dropped send");
}

#[tokio::test]
async fn events_follow_the_send() {
    let Harness {
        mut session,
        retriever,
        transport,
    } = harness();
    retriever.enqueue(vec![page("p1")]);
    transport.enqueue(MockStreamResult::tokens(["A", "B"]));
    let mut events = session.subscribe();

    session
        .send(r#"@document "q" go"#)
        .await
        .expect("send");
    drop(session);

    let mut received = vec![];
    while let Some(event) = events.recv().await {
        received.push(event);
    }
    assert_eq!(
        received,
        vec![
            ChatEvent::RetrievalStarted {
                query: "q".to_string()
            },
            ChatEvent::RetrievalFinished {
                query: "q".to_string(),
                artifacts: 1
            },
            ChatEvent::MessageAppended {
                index: 1,
                role: Role::User
            },
            ChatEvent::MessageAppended {
                index: 2,
                role: Role::Assistant
            },
            ChatEvent::Delta {
                text: "A".to_string()
            },
            ChatEvent::Delta {
                text: "B".to_string()
            },
            ChatEvent::Completed,
        ]
    );
}

#[tokio::test]
async fn search_leaves_context_untouched() {
    let Harness {
        mut session,
        retriever,
        ..
    } = harness();
    retriever.enqueue(vec![page("p1"), page("p2")]);

    let results = session.search("  budget ").await.expect("search");

    assert_eq!(results.len(), 2);
    assert_eq!(retriever.tracked_searches()[0].query, "budget");
    assert!(session.context().is_empty());

    assert_eq!(session.attach(results.into_iter().take(1)), 1);
    assert!(session.context().contains("p1"));
    assert!(session.detach("p1").is_some());

    assert!(matches!(
        session.search(" ").await,
        Err(ChatError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn reset_keeps_the_system_prompt() {
    let Harness {
        mut session,
        transport,
        ..
    } = harness();
    transport.enqueue(MockStreamResult::tokens(["Hi"]));
    session.send("Hello").await.expect("send");

    session.reset().expect("reset");

    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.messages()[0].text(), "Be helpful.");
}

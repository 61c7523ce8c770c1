//! User directory walker tests, including captcha recovery.

mod support;

use onion_forum_crawler::fetch::RawResponse;
use onion_forum_crawler::walker::{
    RecoveryDecision, ScriptedOperator, UserDirectoryWalker, WalkTermination,
};
use support::{
    captcha_page, credential, ctx, fetcher, profile_page, profile_url, user_page, FakeBoard,
};

const PAGE_1: &str = "http://forum.test/userlist.php?p=1";
const PAGE_2: &str = "http://forum.test/userlist.php?p=2";

fn walker(board: &std::sync::Arc<FakeBoard>) -> UserDirectoryWalker {
    UserDirectoryWalker::new(fetcher(board), credential(), PAGE_1, ctx())
}

#[tokio::test]
async fn test_general_walk_follows_next_links() {
    let board = FakeBoard::new();
    board
        .page(PAGE_1, user_page(&["alice", "bob"], Some("userlist.php?p=2")))
        .page(PAGE_2, user_page(&["carol"], None));

    let walk = walker(&board).walk_general().await;

    let names: Vec<&str> = walk.users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, ["alice", "bob", "carol"]);
    assert_eq!(walk.termination, WalkTermination::Exhausted);
    assert_eq!(walk.pages_visited, 2);
    assert_eq!(walk.users[0].post_count, 10);
    assert_eq!(walk.users[0].points, 3);
    assert_eq!(walk.users[0].registration_date, "2022-11-05");
}

#[tokio::test]
async fn test_cyclic_next_links_terminate() {
    let board = FakeBoard::new();
    board
        .page(PAGE_1, user_page(&["alice"], Some("userlist.php?p=2")))
        .page(PAGE_2, user_page(&["bob"], Some("userlist.php?p=1")));

    let walk = walker(&board).walk_general().await;

    let names: Vec<&str> = walk.users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, ["alice", "bob"]);
    assert_eq!(walk.termination, WalkTermination::Exhausted);
    assert_eq!(board.hits(PAGE_1), 1);
    assert_eq!(board.hits(PAGE_2), 1);
}

#[tokio::test]
async fn test_page_linking_to_itself_is_read_once() {
    let board = FakeBoard::new();
    board.page(PAGE_1, user_page(&["alice", "bob"], Some("userlist.php?p=1")));

    let walk = walker(&board).walk_general().await;

    assert_eq!(walk.users.len(), 2);
    assert_eq!(walk.pages_visited, 1);
    assert_eq!(walk.termination, WalkTermination::Exhausted);
    assert_eq!(board.hits(PAGE_1), 1);
}

#[tokio::test]
async fn test_listing_fetch_failure_keeps_earlier_users() {
    let board = FakeBoard::new();
    board
        .page(PAGE_1, user_page(&["alice", "bob"], Some("userlist.php?p=2")))
        .respond(
            PAGE_2,
            RawResponse {
                status: 502,
                body: "Bad Gateway".to_string(),
            },
        );

    let walk = walker(&board).walk_general().await;

    assert_eq!(walk.users.len(), 2);
    assert_eq!(
        walk.termination,
        WalkTermination::FetchFailed {
            url: PAGE_2.to_string()
        }
    );
}

#[tokio::test]
async fn test_general_walk_does_not_recover_from_captcha() {
    let board = FakeBoard::new();
    board.page(PAGE_1, captcha_page());

    let walk = walker(&board).walk_general().await;

    assert!(walk.users.is_empty());
    assert_eq!(
        walk.termination,
        WalkTermination::FetchFailed {
            url: PAGE_1.to_string()
        }
    );
}

#[tokio::test]
async fn test_detailed_walk_merges_profiles() {
    let board = FakeBoard::new();
    board
        .page(PAGE_1, user_page(&["alice", "bob"], None))
        .page(&profile_url("alice"), profile_page("AAAA 1111"))
        .respond(
            &profile_url("bob"),
            RawResponse {
                status: 404,
                body: "Not Found".to_string(),
            },
        );
    let mut operator = ScriptedOperator::default();

    let walk = walker(&board).walk_detailed(&mut operator).await;

    assert_eq!(walk.termination, WalkTermination::Exhausted);
    assert_eq!(walk.users.len(), 2);

    let alice = &walk.users[0];
    assert_eq!(alice.name, "alice");
    assert_eq!(alice.fingerprint.as_deref(), Some("AAAA 1111"));
    assert_eq!(alice.trade_activity.map(|t| t.positive), Some(10));
    assert!(alice.public_key.is_none());
    assert!(alice.feedback_entries.is_empty());

    // An unavailable profile keeps the directory data with empty sections.
    let bob = &walk.users[1];
    assert_eq!(bob.name, "bob");
    assert_eq!(bob.post_count, 10);
    assert!(bob.trade_activity.is_none());
    assert!(bob.fingerprint.is_none());

    assert!(operator.asked().is_empty());
}

#[tokio::test]
async fn test_captcha_recovered_with_new_credential() {
    let board = FakeBoard::new();
    board
        .page(PAGE_1, user_page(&["alice", "bob"], None))
        .page(&profile_url("alice"), captcha_page())
        .page(&profile_url("alice"), profile_page("AAAA"))
        .page(&profile_url("bob"), profile_page("BBBB"));
    let mut operator =
        ScriptedOperator::new([RecoveryDecision::NewCredential("session-two".to_string())]);

    let walk = walker(&board).walk_detailed(&mut operator).await;

    assert_eq!(walk.termination, WalkTermination::Exhausted);
    assert_eq!(walk.users.len(), 2);
    assert_eq!(walk.users[0].fingerprint.as_deref(), Some("AAAA"));
    assert_eq!(operator.asked(), [profile_url("alice")]);

    // The replacement cookie is used for the re-fetch and everything after it.
    let requests = board.requests();
    let tokens: Vec<&str> = requests.iter().map(|(_, t)| t.as_str()).collect();
    assert_eq!(tokens, ["session-one", "session-one", "session-two", "session-two"]);
}

#[tokio::test]
async fn test_captcha_retry_until_cleared() {
    let board = FakeBoard::new();
    board
        .page(PAGE_1, user_page(&["alice"], None))
        .page(&profile_url("alice"), captcha_page())
        .page(&profile_url("alice"), captcha_page())
        .page(&profile_url("alice"), profile_page("AAAA"));
    let mut operator = ScriptedOperator::new([RecoveryDecision::Retry, RecoveryDecision::Retry]);

    let walk = walker(&board).walk_detailed(&mut operator).await;

    assert_eq!(walk.users.len(), 1);
    assert_eq!(walk.users[0].fingerprint.as_deref(), Some("AAAA"));
    assert_eq!(operator.asked().len(), 2);
    assert_eq!(board.hits(&profile_url("alice")), 3);
}

#[tokio::test]
async fn test_operator_abort_keeps_completed_users() {
    let names = ["u1", "u2", "u3", "u4", "u5", "u6", "u7"];
    let board = FakeBoard::new();
    board.page(PAGE_1, user_page(&names, Some("userlist.php?p=2")));
    for name in &names[..5] {
        board.page(&profile_url(name), profile_page(name));
    }
    board.page(&profile_url("u6"), captcha_page());
    board.page(PAGE_2, user_page(&["never"], None));
    let mut operator = ScriptedOperator::new([RecoveryDecision::Abort]);

    let walk = walker(&board).walk_detailed(&mut operator).await;

    assert_eq!(walk.termination, WalkTermination::OperatorAborted);
    let crawled: Vec<&str> = walk.users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(crawled, ["u1", "u2", "u3", "u4", "u5"]);
    assert_eq!(board.hits(&profile_url("u7")), 0);
    assert_eq!(board.hits(PAGE_2), 0);
}

#[tokio::test]
async fn test_captcha_on_listing_is_recovered_in_detailed_walk() {
    let board = FakeBoard::new();
    board
        .page(PAGE_1, captcha_page())
        .page(PAGE_1, user_page(&["alice"], None))
        .page(&profile_url("alice"), profile_page("AAAA"));
    let mut operator = ScriptedOperator::new([RecoveryDecision::Retry]);

    let walk = walker(&board).walk_detailed(&mut operator).await;

    assert_eq!(walk.termination, WalkTermination::Exhausted);
    assert_eq!(walk.users.len(), 1);
    assert_eq!(operator.asked(), [PAGE_1.to_string()]);
}

/// Concurrent access tests
///
/// Many tasks sharing one registry and one index: termination races have a
/// single winner and writes never interleave with a commit.
/// Run with: cargo test --test concurrent_access_tests
mod common;

use common::*;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use txsearch::{DetachedSession, Repository, SearchParameters, TransactionState};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_begin_and_get() {
    let repo = Arc::new(open_repository().await);
    let num_tasks = 20;

    let mut handles = vec![];
    for task_id in 0..num_tasks {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            let owner = format!("user_{}", task_id);
            let tx = repo
                .transactions()
                .begin(Box::new(DetachedSession), &owner)
                .await;
            for _ in 0..10 {
                let fetched = repo.transactions().get(tx.id(), &owner).await.unwrap();
                assert_eq!(fetched.id(), tx.id());
            }
            tx.id().clone()
        }));
    }

    let ids: HashSet<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();
    assert_eq!(ids.len(), num_tasks);
    assert_eq!(repo.transactions().len().await, num_tasks);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_commit_and_rollback_race_has_one_winner() {
    let repo = Arc::new(open_repository().await);

    for round in 0..10 {
        let tx = repo
            .transactions()
            .begin(Box::new(DetachedSession), "alice")
            .await;
        repo.index()
            .add_update(Some(&tx), &record(&format!("info:fedora/race/{}", round)))
            .await
            .unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let commit = tokio::spawn({
            let (repo, barrier, id) = (Arc::clone(&repo), Arc::clone(&barrier), tx.id().clone());
            async move {
                barrier.wait().await;
                repo.transactions().commit(&id).await.map(|_| ())
            }
        });
        let rollback = tokio::spawn({
            let (repo, barrier, id) = (Arc::clone(&repo), Arc::clone(&barrier), tx.id().clone());
            async move {
                barrier.wait().await;
                repo.transactions().rollback(&id).await
            }
        });

        let committed = commit.await.unwrap();
        let rolled_back = rollback.await.unwrap();
        assert!(committed.is_ok() != rolled_back.is_ok(), "round {}", round);

        let visible = find(&repo, &format!("info:fedora/race/{}", round)).await.len();
        match tx.state().await {
            TransactionState::Committed => {
                assert!(rolled_back.unwrap_err().is_transaction_missing());
                assert_eq!(visible, 1);
            }
            TransactionState::RolledBack => {
                assert!(committed.unwrap_err().is_transaction_missing());
                assert_eq!(visible, 0);
            }
            other => panic!("unexpected state {}", other),
        }
        assert_eq!(staged_rows(repo.database(), tx.id()).await, 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reaper_and_rollback_race_has_one_winner() {
    let config = txsearch::RepositoryConfig::in_memory().reap_interval(Duration::from_secs(3600));
    let repo = Arc::new(open_repository_with(config, Arc::new(txsearch::NoVersioning)).await);

    for _ in 0..10 {
        let tx = repo
            .transactions()
            .begin(Box::new(DetachedSession), "alice")
            .await;
        tx.expire();

        let reap = tokio::spawn({
            let repo = Arc::clone(&repo);
            async move { repo.transactions().reap_expired().await }
        });
        let rollback = repo.transactions().rollback(tx.id()).await;
        let report = reap.await.unwrap();

        match rollback {
            Ok(()) => assert_eq!(report.reaped, 0),
            Err(err) => {
                assert!(err.is_transaction_missing());
                assert_eq!(report.reaped, 1);
            }
        }
        assert_eq!(tx.state().await, TransactionState::RolledBack);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_commit_waits_for_in_flight_write() {
    let repo = Arc::new(open_repository().await);
    let tx = repo
        .transactions()
        .begin(Box::new(DetachedSession), "alice")
        .await;

    let guard = tx.begin_write().await.unwrap();
    let commit = tokio::spawn({
        let (repo, id) = (Arc::clone(&repo), tx.id().clone());
        async move { repo.transactions().commit(&id).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!commit.is_finished());
    // The entry is already claimed even though the commit is still waiting.
    assert!(!repo.transactions().exists(tx.id()).await);

    drop(guard);
    commit.await.unwrap().unwrap();
    assert_eq!(tx.state().await, TransactionState::Committed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_transactions_all_commit() {
    let repo: Arc<Repository> = Arc::new(open_repository().await);
    let num_tasks = 8;

    let mut handles = vec![];
    for task_id in 0..num_tasks {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            let tx = repo
                .transactions()
                .begin(Box::new(DetachedSession), "alice")
                .await;
            for item in 0..3 {
                let resource = record(&format!("info:fedora/task{}/item{}", task_id, item))
                    .rdf_type(format!("http://ex/Task{}", task_id))
                    .rdf_type("http://ex/Shared");
                repo.index().add_update(Some(&tx), &resource).await.unwrap();
            }
            repo.transactions().commit(tx.id()).await.unwrap();
        }));
    }
    for joined in join_all(handles).await {
        joined.unwrap();
    }

    let params = SearchParameters::new().include_total_count(true);
    let result = repo.index().search(&params).await.unwrap();
    assert_eq!(result.pagination.total_results, Some((num_tasks * 3) as i64));
    assert_eq!(
        table_count(repo.database(), "search_rdf_type").await,
        (num_tasks + 1) as i64
    );
    assert_eq!(
        table_count(repo.database(), "search_resource_rdf_type").await,
        (num_tasks * 3 * 2) as i64
    );
    assert_eq!(table_count(repo.database(), "simple_search_transactions").await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_direct_writes_share_type_catalog() {
    let repo = Arc::new(open_repository().await);

    let mut handles = vec![];
    for task_id in 0..10 {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            let resource = record(&format!("info:fedora/direct/{}", task_id))
                .rdf_type("http://ex/Common");
            repo.index().add_update(None, &resource).await.unwrap();
        }));
    }
    for joined in join_all(handles).await {
        joined.unwrap();
    }

    assert_eq!(table_count(repo.database(), "search_rdf_type").await, 1);
    assert_eq!(table_count(repo.database(), "search_resource_rdf_type").await, 10);
}

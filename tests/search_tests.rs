/// Search tests
///
/// Direct writes, filters, ordering, paging and RDF type aggregation against
/// the durable index.
/// Run with: cargo test --test search_tests
mod common;

use chrono::{TimeZone, Utc};
use common::*;
use txsearch::{
    Condition, DetachedSession, Field, IndexError, Repository, SearchParameters, SortOrder,
};

async fn seeded_repository() -> Repository {
    let repo = open_repository().await;
    let index = repo.index();
    let day = |d: u32| Utc.with_ymd_and_hms(2021, 3, d, 12, 0, 0).unwrap();

    index
        .add_update(
            None,
            &record("info:fedora/books/moby")
                .created(day(1))
                .modified(day(1))
                .content_size(1200)
                .mime_type("text/plain")
                .rdf_type("http://ex/Book")
                .rdf_type("http://ex/Classic"),
        )
        .await
        .unwrap();
    index
        .add_update(
            None,
            &record("info:fedora/books/ulysses")
                .created(day(2))
                .modified(day(5))
                .content_size(5000)
                .mime_type("text/html")
                .rdf_type("http://ex/Book"),
        )
        .await
        .unwrap();
    index
        .add_update(
            None,
            &record("info:fedora/images/map")
                .created(day(3))
                .modified(day(3))
                .content_size(80)
                .mime_type("image/png"),
        )
        .await
        .unwrap();
    repo
}

fn ids(result: &txsearch::SearchResult) -> Vec<&str> {
    result
        .items
        .iter()
        .filter_map(|hit| hit.fedora_id.as_deref())
        .collect()
}

fn with(conditions: &[&str]) -> SearchParameters {
    conditions.iter().fold(SearchParameters::new(), |params, c| {
        params.condition(Condition::parse(c).unwrap())
    })
}

#[tokio::test]
async fn test_direct_write_is_immediately_visible() {
    let repo = open_repository().await;
    repo.index()
        .add_update(None, &record("info:fedora/z").mime_type("text/plain"))
        .await
        .unwrap();

    let hits = find(&repo, "info:fedora/z").await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].fedora_id.as_deref(), Some("info:fedora/z"));
    assert!(repo.transactions().is_empty().await);
}

#[tokio::test]
async fn test_direct_remove_is_immediate() {
    let repo = seeded_repository().await;
    repo.index()
        .remove(None, &fedora_id("info:fedora/books/moby"))
        .await
        .unwrap();

    assert!(find(&repo, "info:fedora/books/moby").await.is_empty());
    // Only ulysses' association remains.
    assert_eq!(table_count(repo.database(), "search_resource_rdf_type").await, 1);
}

#[tokio::test]
async fn test_default_search_returns_everything_in_id_order() {
    let repo = seeded_repository().await;
    let result = repo.index().search(&SearchParameters::new()).await.unwrap();

    assert_eq!(
        ids(&result),
        vec![
            "info:fedora/books/moby",
            "info:fedora/books/ulysses",
            "info:fedora/images/map"
        ]
    );
    assert_eq!(result.pagination.max_results, 100);
    assert_eq!(result.pagination.offset, 0);
    assert_eq!(result.pagination.total_results, None);

    // rdf_type is not a default field.
    assert!(result.items.iter().all(|hit| hit.rdf_type.is_none()));
    assert!(result.items.iter().all(|hit| hit.created.is_some()));
}

#[tokio::test]
async fn test_wildcard_fedora_id() {
    let repo = seeded_repository().await;
    let result = repo
        .index()
        .search(&with(&["fedora_id=info:fedora/books/*"]))
        .await
        .unwrap();
    assert_eq!(
        ids(&result),
        vec!["info:fedora/books/moby", "info:fedora/books/ulysses"]
    );

    let everything = repo.index().search(&with(&["fedora_id=*"])).await.unwrap();
    assert_eq!(everything.items.len(), 3);
}

#[tokio::test]
async fn test_mime_type_exact_and_wildcard() {
    let repo = seeded_repository().await;
    let exact = repo.index().search(&with(&["mime_type=image/png"])).await.unwrap();
    assert_eq!(ids(&exact), vec!["info:fedora/images/map"]);

    let text = repo.index().search(&with(&["mime_type=text/*"])).await.unwrap();
    assert_eq!(text.items.len(), 2);
}

#[tokio::test]
async fn test_wildcards_ignore_case() {
    let repo = seeded_repository().await;
    let books = repo
        .index()
        .search(&with(&["fedora_id=INFO:fedora/Books/*"]))
        .await
        .unwrap();
    assert_eq!(
        ids(&books),
        vec!["info:fedora/books/moby", "info:fedora/books/ulysses"]
    );

    let classic = repo.index().search(&with(&["rdf_type=*classic"])).await.unwrap();
    assert_eq!(ids(&classic), vec!["info:fedora/books/moby"]);
}

#[tokio::test]
async fn test_content_size_comparisons() {
    let repo = seeded_repository().await;
    let large = repo.index().search(&with(&["content_size>1200"])).await.unwrap();
    assert_eq!(ids(&large), vec!["info:fedora/books/ulysses"]);

    let at_least = repo.index().search(&with(&["content_size>=1200"])).await.unwrap();
    assert_eq!(at_least.items.len(), 2);

    let range = repo
        .index()
        .search(&with(&["content_size>50", "content_size<=1200"]))
        .await
        .unwrap();
    assert_eq!(
        ids(&range),
        vec!["info:fedora/books/moby", "info:fedora/images/map"]
    );
}

#[tokio::test]
async fn test_date_conditions_accept_several_formats() {
    let repo = seeded_repository().await;

    let by_date = repo.index().search(&with(&["created>=2021-03-02"])).await.unwrap();
    assert_eq!(
        ids(&by_date),
        vec!["info:fedora/books/ulysses", "info:fedora/images/map"]
    );

    let by_instant = repo
        .index()
        .search(&with(&["modified>2021-03-04T00:00:00Z"]))
        .await
        .unwrap();
    assert_eq!(ids(&by_instant), vec!["info:fedora/books/ulysses"]);

    let by_naive = repo
        .index()
        .search(&with(&["created<2021-03-01 12:00:01"]))
        .await
        .unwrap();
    assert_eq!(ids(&by_naive), vec!["info:fedora/books/moby"]);
}

#[tokio::test]
async fn test_rdf_type_filter_and_aggregation() {
    let repo = seeded_repository().await;
    let params = with(&["rdf_type=http://ex/Book"]).fields([Field::FedoraId, Field::RdfType]);
    let result = repo.index().search(&params).await.unwrap();

    assert_eq!(
        ids(&result),
        vec!["info:fedora/books/moby", "info:fedora/books/ulysses"]
    );
    // The aggregate lists every type of the row, not only the matching one.
    assert_eq!(
        result.items[0].rdf_type,
        Some(vec![
            "http://ex/Book".to_string(),
            "http://ex/Classic".to_string()
        ])
    );
    assert_eq!(
        result.items[1].rdf_type,
        Some(vec!["http://ex/Book".to_string()])
    );
    assert!(result.items[0].mime_type.is_none());
}

#[tokio::test]
async fn test_rdf_type_wildcard_and_untyped_rows() {
    let repo = seeded_repository().await;
    let classic = repo
        .index()
        .search(&with(&["rdf_type=*Classic"]))
        .await
        .unwrap();
    assert_eq!(ids(&classic), vec!["info:fedora/books/moby"]);

    let all = SearchParameters::new().fields([Field::FedoraId, Field::RdfType]);
    let result = repo.index().search(&all).await.unwrap();
    assert_eq!(result.items.len(), 3);
    assert_eq!(result.items[2].rdf_type, Some(Vec::new()));
}

#[tokio::test]
async fn test_ordering_and_paging() {
    let repo = seeded_repository().await;
    let params = SearchParameters::new()
        .order_by(Field::ContentSize, SortOrder::Desc)
        .max_results(2)
        .include_total_count(true);

    let first = repo.index().search(&params).await.unwrap();
    assert_eq!(
        ids(&first),
        vec!["info:fedora/books/ulysses", "info:fedora/books/moby"]
    );
    assert_eq!(first.pagination.total_results, Some(3));

    let second = repo.index().search(&params.clone().offset(2)).await.unwrap();
    assert_eq!(ids(&second), vec!["info:fedora/images/map"]);
    assert_eq!(second.pagination.offset, 2);
    assert_eq!(second.pagination.total_results, Some(3));
}

#[tokio::test]
async fn test_total_count_honours_filters() {
    let repo = seeded_repository().await;
    let params = with(&["mime_type=text/*"])
        .max_results(1)
        .include_total_count(true);
    let result = repo.index().search(&params).await.unwrap();

    assert_eq!(result.items.len(), 1);
    assert_eq!(result.pagination.total_results, Some(2));
}

#[tokio::test]
async fn test_invalid_parameters_are_rejected() {
    let repo = seeded_repository().await;
    let err = repo
        .index()
        .search(&SearchParameters::new().max_results(0))
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::InvalidQuery(_)));

    let err = repo
        .index()
        .search(&SearchParameters::new().order_by(Field::RdfType, SortOrder::Asc))
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::InvalidQuery(_)));
}

#[tokio::test]
async fn test_values_are_bound_not_spliced() {
    let repo = seeded_repository().await;
    let result = repo
        .index()
        .search(&with(&["fedora_id=x' OR '1'='1"]))
        .await
        .unwrap();
    assert!(result.items.is_empty());
    assert_eq!(table_count(repo.database(), "simple_search").await, 3);
}

#[tokio::test]
async fn test_search_ignores_uncommitted_transactions() {
    let repo = seeded_repository().await;
    let tx = repo.transactions().begin(Box::new(DetachedSession), "alice").await;
    repo.index()
        .remove(Some(&tx), &fedora_id("info:fedora/images/map"))
        .await
        .unwrap();

    let result = repo.index().search(&SearchParameters::new()).await.unwrap();
    assert_eq!(result.items.len(), 3);
}

#[tokio::test]
async fn test_reset_empties_index_and_type_cache() {
    let repo = seeded_repository().await;
    assert!(!repo.index().type_catalog().is_empty());

    repo.index().reset().await.unwrap();

    let result = repo.index().search(&SearchParameters::new()).await.unwrap();
    assert!(result.items.is_empty());
    assert_eq!(table_count(repo.database(), "search_rdf_type").await, 0);
    assert!(repo.index().type_catalog().is_empty());

    // Types are re-cataloged after a reset.
    repo.index()
        .add_update(None, &record("info:fedora/again").rdf_type("http://ex/Book"))
        .await
        .unwrap();
    let hits = find(&repo, "info:fedora/again").await;
    assert_eq!(hits[0].rdf_type, Some(vec!["http://ex/Book".to_string()]));
}

#[tokio::test]
async fn test_serialized_result_shape() {
    let repo = seeded_repository().await;
    let params = with(&["fedora_id=info:fedora/images/map"]).include_total_count(true);
    let result = repo.index().search(&params).await.unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["items"][0]["fedora_id"], "info:fedora/images/map");
    assert_eq!(json["items"][0]["created"], "2021-03-03T12:00:00Z");
    assert_eq!(json["items"][0]["content_size"], 80);
    assert_eq!(json["pagination"]["total_results"], 1);
    assert!(json["items"][0].get("rdf_type").is_none());
}

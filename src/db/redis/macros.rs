/// Read-through caching against the redis [`Cache`](crate::db::Cache).
///
/// Returns the cached value when present. Otherwise awaits `$block`, hands the
/// result to the background writer with `$ttl` seconds to live, and returns it.
/// Cache read errors propagate with `?`, so callers that treat the cache as
/// optional should check connectivity first.
///
/// # Example
/// ```rust,ignore
/// let recs: Vec<Recommendation> = cached!(
///     cache,
///     CacheKey::UserRecommendations(user_id.clone()),
///     300,
///     async { reader.recommendations_for(&user_id, 100).await }
/// )?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        if let Some(cached) = $cache.get_from_cache(&$key).await? {
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.set_in_background(&$key, &value, $ttl);
            Ok(value)
        }
    }};
}

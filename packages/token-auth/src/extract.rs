/// Query parameter carrying the token.
pub const TOKEN_PARAM: &str = "token=";

/// Extract the raw `token` query parameter from a path and query string.
///
/// Example: `/?token=jwt_token&other=params` yields `jwt_token`.
///
/// This is a permissive scan, not a URI parser: the query is whatever follows
/// the first `?`, split on `&`, and the first segment starting with `token=`
/// wins. No percent-decoding is applied, so a token containing `&` is cut
/// short. Returns an empty string when there is no such segment.
pub fn extract_token(path_and_query: &str) -> &str {
    let Some((_, query)) = path_and_query.split_once('?') else {
        return "";
    };

    query
        .split('&')
        .find_map(|param| param.strip_prefix(TOKEN_PARAM))
        .unwrap_or("")
}

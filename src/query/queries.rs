/// Public auction state, cache columns included.
pub const GET_AUCTION_STATE: &str = r#"
    SELECT id, seller_id, title, start_price, step_price, buy_now_price,
           current_price, leading_bidder_id, bid_count, status, end_time, created_at
    FROM auctions
    WHERE id = $1
"#;

/// Full bid history for an auction, newest first. Excluded bidders' rows are
/// part of history; exclusion hides them from pricing, not from the record.
pub const GET_BID_HISTORY: &str = r#"
    SELECT id, auction_id, bidder_id, amount, submitted_at
    FROM bids
    WHERE auction_id = $1
    ORDER BY submitted_at DESC, id DESC
"#;

/// Bidders excluded from an auction.
pub const GET_EXCLUSIONS: &str = r#"
    SELECT bidder_id
    FROM auction_exclusions
    WHERE auction_id = $1
    ORDER BY bidder_id
"#;

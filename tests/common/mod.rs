#![allow(dead_code)]

use std::sync::Arc;

use cocoindex_cassandra::{
    ConnectorContext, Item, ItemReader, MemoryCluster, Record, SessionProvider, Value, WireValue,
    logging,
};

pub const TRADE_COLUMNS: &[(&str, &str)] = &[
    ("id", "int"),
    ("symbol", "text"),
    ("price", "double"),
    ("traded_at", "timestamp"),
    ("volume", "bigint"),
];

/// A `trades` table with rows `id = 1..=rows`; every third row has no volume.
pub fn trades_cluster(rows: i32) -> MemoryCluster {
    logging::init();
    let cluster = MemoryCluster::new();
    cluster.create_table("trades", TRADE_COLUMNS).unwrap();
    for id in 1..=rows {
        cluster
            .insert_row(
                "trades",
                vec![
                    Some(WireValue::Int(id)),
                    Some(WireValue::Text(format!("SYM{id}"))),
                    Some(WireValue::Double(f64::from(id) * 1.5)),
                    Some(WireValue::Timestamp(1_700_000_000_000 + i64::from(id) * 1_000)),
                    (id % 3 != 0).then(|| WireValue::BigInt(i64::from(id) * 100)),
                ],
            )
            .unwrap();
    }
    cluster
}

/// Sessions are opened (and closed) by the connector.
pub fn cluster_context(cluster: &MemoryCluster) -> ConnectorContext {
    ConnectorContext::new(SessionProvider::Cluster(Arc::new(cluster.clone())))
}

pub fn read_all<R: ItemReader>(reader: &mut R) -> Vec<R::Item> {
    let mut items = Vec::new();
    while let Some(item) = reader.read_item().unwrap() {
        items.push(item);
    }
    items
}

/// The `id` of a mapping or positional item.
pub fn item_id<T: Record>(item: &Item<T>) -> i32 {
    let value = match item {
        Item::Mapping(map) => &map["id"],
        Item::Positional(values) => &values[0],
        Item::Object(_) => panic!("object items carry no generic id"),
    };
    match value {
        Value::Int32(id) => *id,
        other => panic!("unexpected id {other:?}"),
    }
}

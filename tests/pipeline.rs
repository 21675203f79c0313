//! End-to-end tests: chunked read/write jobs with restart, custom codecs,
//! the statement batchlet and specs loaded from files.

mod common;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, bail};
use cocoindex_cassandra::client::ClusterConfig;
use cocoindex_cassandra::{
    Batchlet, BatchletSpec, CassandraBatchlet, CassandraItemReader, CassandraItemWriter,
    Checkpoint, Codec, CodecFactoryRegistry, ConnectorContext, Error, HostType, HostValue, Item,
    ItemReader, ItemShape, ItemWriter, MemoryCluster, ReaderSpec, Record, RecordSchemaBuilder,
    SessionProvider, Value, WireType, WireValue, WriterSpec, settings,
};
use common::{cluster_context, item_id, read_all, trades_cluster};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Runs read/write chunks until the reader is exhausted or a step fails.
/// `committed` only advances after a chunk is written.
fn run_job<R, W>(
    reader: &mut R,
    writer: &mut W,
    chunk_size: usize,
    committed: &mut Option<Checkpoint>,
) -> cocoindex_cassandra::Result<()>
where
    R: ItemReader,
    W: ItemWriter<Item = R::Item>,
{
    reader.open(*committed)?;
    writer.open(None)?;
    loop {
        let mut chunk = Vec::with_capacity(chunk_size);
        while chunk.len() < chunk_size {
            match reader.read_item()? {
                Some(item) => chunk.push(item),
                None => break,
            }
        }
        if chunk.is_empty() {
            break;
        }
        writer.write_items(chunk)?;
        *committed = reader.checkpoint_info();
    }
    reader.close();
    writer.close();
    Ok(())
}

fn archive_ids(cluster: &MemoryCluster) -> Vec<i32> {
    cluster
        .rows("archive")
        .unwrap()
        .iter()
        .map(|row| match row.get(0) {
            Some(WireValue::Int(id)) => *id,
            other => panic!("unexpected id {other:?}"),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Chunked jobs
// ---------------------------------------------------------------------------

#[test]
fn job_restarts_from_last_committed_chunk() {
    let cluster = trades_cluster(10);
    cluster
        .create_table("archive", &[("id", "int"), ("symbol", "text"), ("price", "double")])
        .unwrap();
    let context = cluster_context(&cluster);
    let reader_spec = ReaderSpec {
        cql: "SELECT id, symbol, price FROM trades".into(),
        fetch_size: Some(3),
        ..Default::default()
    };
    let writer_spec = WriterSpec {
        cql: "INSERT INTO archive (id, symbol, price) VALUES (?, ?, ?)".into(),
        ..Default::default()
    };
    let mut committed = None;

    // Two chunks land, then the store rejects the third.
    {
        let mut reader: CassandraItemReader = CassandraItemReader::new(reader_spec.clone(), &context).unwrap();
        let mut writer: CassandraItemWriter = CassandraItemWriter::new(writer_spec.clone(), &context).unwrap();
        reader.open(None).unwrap();
        writer.open(None).unwrap();
        for _ in 0..2 {
            let chunk: Vec<_> = (0..4).map(|_| reader.read_item().unwrap().unwrap()).collect();
            writer.write_items(chunk).unwrap();
            committed = reader.checkpoint_info();
        }
        cluster.fail_next_batch("coordinator timeout");
        let chunk: Vec<_> = (0..2).map(|_| reader.read_item().unwrap().unwrap()).collect();
        assert!(writer.write_items(chunk).is_err());
        // Dropped without close, as on a crash.
    }
    assert_eq!(committed, Some(Checkpoint(9)));
    assert_eq!(archive_ids(&cluster), (1..=8).collect::<Vec<_>>());

    let mut reader: CassandraItemReader = CassandraItemReader::new(reader_spec, &context).unwrap();
    let mut writer: CassandraItemWriter = CassandraItemWriter::new(writer_spec, &context).unwrap();
    run_job(&mut reader, &mut writer, 4, &mut committed).unwrap();

    assert_eq!(archive_ids(&cluster), (1..=10).collect::<Vec<_>>());
    assert_eq!(committed, Some(Checkpoint(11)));
    assert_eq!(cluster.sessions_opened(), cluster.sessions_closed());
}

#[test]
fn windowed_jobs_partition_the_source() {
    let cluster = trades_cluster(9);
    cluster
        .create_table("archive", &[("id", "int"), ("symbol", "text"), ("price", "double")])
        .unwrap();
    let context = cluster_context(&cluster);

    for (start, end) in [(1, 3), (4, 6), (7, 0)] {
        let mut reader: CassandraItemReader = CassandraItemReader::new(
            ReaderSpec {
                cql: "SELECT id, symbol, price FROM trades".into(),
                shape: ItemShape::Positional,
                start,
                end,
                ..Default::default()
            },
            &context,
        )
        .unwrap();
        let mut writer: CassandraItemWriter = CassandraItemWriter::new(
            WriterSpec {
                cql: "INSERT INTO archive (id, symbol, price) VALUES (?, ?, ?)".into(),
                shape: ItemShape::Positional,
                ..Default::default()
            },
            &context,
        )
        .unwrap();
        run_job(&mut reader, &mut writer, 2, &mut None).unwrap();
    }
    assert_eq!(archive_ids(&cluster), (1..=9).collect::<Vec<_>>());
}

// ---------------------------------------------------------------------------
// Custom codecs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Point {
    x: i32,
    y: i32,
}

impl HostValue for Point {
    fn host_type() -> HostType {
        HostType::opaque::<Point>()
    }

    fn into_value(self) -> Value {
        Value::opaque(self)
    }

    fn from_value(value: Value) -> cocoindex_cassandra::Result<Self> {
        match &value {
            Value::Opaque(o) => o
                .downcast_ref::<Point>()
                .copied()
                .ok_or_else(|| Error::conversion(format!("{value:?} is not a point"))),
            other => Err(Error::conversion(format!("{other:?} is not a point"))),
        }
    }
}

struct PointCodec;

impl Codec for PointCodec {
    fn name(&self) -> &str {
        "point"
    }

    fn accepts_wire_type(&self, wire_type: &WireType) -> bool {
        *wire_type == WireType::Tuple(vec![WireType::Int, WireType::Int])
    }

    fn accepts_host_type(&self, host_type: &HostType) -> bool {
        *host_type == Point::host_type()
    }

    fn decode(&self, value: &WireValue, _: &WireType) -> anyhow::Result<Value> {
        let WireValue::Tuple(fields) = value else {
            bail!("not a tuple: {value}");
        };
        match fields.as_slice() {
            [Some(WireValue::Int(x)), Some(WireValue::Int(y))] => {
                Ok(Value::opaque(Point { x: *x, y: *y }))
            }
            _ => bail!("incomplete point {value}"),
        }
    }

    fn encode(&self, value: &Value, _: &WireType) -> anyhow::Result<WireValue> {
        let Value::Opaque(o) = value else {
            bail!("not a point: {value}");
        };
        let point = o.downcast_ref::<Point>().context("not a point")?;
        Ok(WireValue::Tuple(vec![
            Some(WireValue::Int(point.x)),
            Some(WireValue::Int(point.y)),
        ]))
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Place {
    name: String,
    loc: Point,
}

impl Record for Place {
    fn describe(schema: &mut RecordSchemaBuilder<Self>) {
        schema
            .field("name", |p| &p.name, |p| &mut p.name)
            .field("loc", |p| &p.loc, |p| &mut p.loc);
    }
}

#[test]
fn named_codec_maps_tuples_to_user_type() {
    let cluster = MemoryCluster::new();
    for table in ["places", "places_copy"] {
        cluster
            .create_table(table, &[("name", "text"), ("loc", "tuple<int, int>")])
            .unwrap();
    }
    for (name, x, y) in [("home", 1, 2), ("work", -3, 4)] {
        cluster
            .insert_row(
                "places",
                vec![
                    Some(WireValue::Text(name.into())),
                    Some(WireValue::Tuple(vec![
                        Some(WireValue::Int(x)),
                        Some(WireValue::Int(y)),
                    ])),
                ],
            )
            .unwrap();
    }

    let mut factories = CodecFactoryRegistry::new();
    factories.register("point", || Arc::new(PointCodec) as Arc<dyn Codec>);
    let context = cluster_context(&cluster).with_codec_factories(factories);

    let mut reader = CassandraItemReader::<Place>::new(
        ReaderSpec {
            cql: "SELECT name, loc FROM places".into(),
            shape: ItemShape::Object,
            custom_codecs: vec!["point".into()],
            ..Default::default()
        },
        &context,
    )
    .unwrap();
    reader.open(None).unwrap();
    let items = read_all(&mut reader);
    reader.close();

    let places: Vec<Place> = items
        .iter()
        .cloned()
        .filter_map(Item::into_object)
        .collect();
    assert_eq!(
        places,
        vec![
            Place {
                name: "home".into(),
                loc: Point { x: 1, y: 2 },
            },
            Place {
                name: "work".into(),
                loc: Point { x: -3, y: 4 },
            },
        ]
    );

    let mut writer = CassandraItemWriter::<Place>::new(
        WriterSpec {
            cql: "INSERT INTO places_copy (name, loc) VALUES (?, ?)".into(),
            shape: ItemShape::Object,
            custom_codecs: vec!["point".into()],
            ..Default::default()
        },
        &context,
    )
    .unwrap();
    writer.open(None).unwrap();
    writer.write_items(items).unwrap();
    writer.close();
    assert_eq!(cluster.rows("places_copy").unwrap(), cluster.rows("places").unwrap());
}

#[test]
fn codec_is_unused_unless_named() {
    let cluster = MemoryCluster::new();
    cluster
        .create_table("places", &[("name", "text"), ("loc", "tuple<int, int>")])
        .unwrap();
    cluster
        .insert_row(
            "places",
            vec![
                Some(WireValue::Text("home".into())),
                Some(WireValue::Tuple(vec![Some(WireValue::Int(1)), Some(WireValue::Int(2))])),
            ],
        )
        .unwrap();
    let mut factories = CodecFactoryRegistry::new();
    factories.register("point", || Arc::new(PointCodec) as Arc<dyn Codec>);
    let context = cluster_context(&cluster).with_codec_factories(factories);

    let mut reader = CassandraItemReader::<Place>::new(
        ReaderSpec {
            cql: "SELECT name, loc FROM places".into(),
            shape: ItemShape::Object,
            ..Default::default()
        },
        &context,
    )
    .unwrap();
    reader.open(None).unwrap();
    let err = reader.read_item().unwrap_err();
    assert!(matches!(err, Error::Conversion(_)), "{err}");
}

// ---------------------------------------------------------------------------
// Batchlet
// ---------------------------------------------------------------------------

#[test]
fn batchlet_reports_first_row_and_releases() {
    let cluster = trades_cluster(3);
    let mut batchlet = CassandraBatchlet::new(
        BatchletSpec {
            cql: "SELECT id, symbol, volume FROM trades LIMIT 1".into(),
            ..Default::default()
        },
        &cluster_context(&cluster),
    )
    .unwrap();
    assert_eq!(batchlet.process().unwrap().as_deref(), Some("Row[1, SYM1, 100]"));
    assert_eq!(cluster.sessions_closed(), 1);

    cluster.create_table("empty", &[("id", "int")]).unwrap();
    let mut batchlet = CassandraBatchlet::new(
        BatchletSpec {
            cql: "SELECT id FROM empty".into(),
            ..Default::default()
        },
        &cluster_context(&cluster),
    )
    .unwrap();
    assert_eq!(batchlet.process().unwrap(), None);
    batchlet.stop();
}

#[test]
fn batchlet_failure_still_releases() {
    let cluster = trades_cluster(1);
    let mut batchlet = CassandraBatchlet::new(
        BatchletSpec {
            cql: "SELECT id FROM missing".into(),
            ..Default::default()
        },
        &cluster_context(&cluster),
    )
    .unwrap();
    assert!(matches!(batchlet.process(), Err(Error::Store(_))));
    assert_eq!(cluster.sessions_opened(), 1);
    assert_eq!(cluster.sessions_closed(), 1);
}

// ---------------------------------------------------------------------------
// Specs from files
// ---------------------------------------------------------------------------

#[test]
fn reader_spec_loads_from_toml() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(
        file,
        r#"
cql = "SELECT id, symbol FROM trades"
shape = "positional"
start = 2
end = 4

[connection]
contact_points = ["127.0.0.1"]
keyspace = "market"

[connection.cluster_properties]
port = "9142"
"#
    )
    .unwrap();

    let spec: ReaderSpec = settings::load(file.path(), None).unwrap();
    assert_eq!(spec.shape, ItemShape::Positional);
    assert_eq!(spec.connection.keyspace.as_deref(), Some("market"));
    let config = ClusterConfig::from_spec(&spec.connection).unwrap();
    assert_eq!(config.port, 9142);
    assert_eq!(config.contact_points[0].port(), 9142);

    let cluster = trades_cluster(5);
    let mut reader: CassandraItemReader = CassandraItemReader::new(spec, &cluster_context(&cluster)).unwrap();
    reader.open(None).unwrap();
    let ids: Vec<i32> = read_all(&mut reader).iter().map(item_id).collect();
    assert_eq!(ids, vec![2, 3, 4]);
}

#[test]
fn unknown_spec_field_is_rejected() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "cql = \"SELECT id FROM trades\"\nlimit = 3").unwrap();
    let err = settings::load::<WriterSpec>(file.path(), None).unwrap_err();
    assert!(err.is_config(), "{err}");
}

#[test]
fn connector_context_from_session() {
    let cluster = trades_cluster(2);
    let context = ConnectorContext::new(SessionProvider::Session(cluster.session()));
    let mut reader: CassandraItemReader = CassandraItemReader::new(
        ReaderSpec {
            cql: "SELECT id FROM trades".into(),
            ..Default::default()
        },
        &context,
    )
    .unwrap();
    reader.open(None).unwrap();
    assert_eq!(read_all(&mut reader).len(), 2);
    reader.close();
    assert_eq!(cluster.sessions_closed(), 0);
}

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;
use tupledb::engine::MemoryEngine;
use tupledb::schema::{create_table, Column, Schema};
use tupledb::shove::{ColumnType, IndexKind};
use tupledb::table_ops::{get, put, PutMode};
use tupledb::value::{Row, Value};

fn mock_row(id: u64) -> Row {
    let mut rng = rand::thread_rng();
    let mut row = Row::new();
    row.set(0, Value::Uint64(id));
    row.set(1, Value::String("张三".to_string()));
    row.set(2, Value::Uint32(rng.gen_range(0..80)));
    row.set(3, Value::String("杭州余杭区".to_string()));
    row
}

fn populated_table(rows: u64) -> (MemoryEngine, Schema) {
    let engine = MemoryEngine::new();
    let columns = vec![
        Column::new("id", IndexKind::PRIMARY | IndexKind::UNIQUE | IndexKind::ORDERED, ColumnType::Uint64),
        Column::new("name", IndexKind::empty(), ColumnType::String),
        Column::new("age", IndexKind::empty(), ColumnType::Uint32),
        Column::new("address", IndexKind::empty(), ColumnType::String),
    ];
    let schema = create_table(&engine, Schema::new("people", columns, Vec::new()), 1).unwrap();
    for id in 0..rows {
        put(&engine, &schema, &mock_row(id), PutMode::Insert).unwrap();
    }
    (engine, schema)
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("put 1000 rows", |b| {
        b.iter(|| {
            let engine = MemoryEngine::new();
            let columns = vec![
                Column::new("id", IndexKind::PRIMARY | IndexKind::UNIQUE | IndexKind::ORDERED, ColumnType::Uint64),
                Column::new("name", IndexKind::empty(), ColumnType::String),
                Column::new("age", IndexKind::empty(), ColumnType::Uint32),
                Column::new("address", IndexKind::empty(), ColumnType::String),
            ];
            let schema = create_table(&engine, Schema::new("people", columns, Vec::new()), 1).unwrap();
            for id in 0..black_box(1000u64) {
                put(&engine, &schema, &mock_row(id), PutMode::Insert).unwrap();
            }
        })
    });

    let (engine, schema) = populated_table(1000);
    c.bench_function("get by primary key, 1000-row table", |b| {
        b.iter(|| get(&engine, &schema, 0, &Value::Uint64(black_box(500))).unwrap())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

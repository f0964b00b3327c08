//! Property tests: values written through a database map read back, and
//! clearing them removes only the addressed leaf.

use proptest::prelude::*;
use stepvault_core::{CoreError, PropertyPath, TransactionMode, Value};
use stepvault_step::DatabaseMap;
use stepvault_testkit::prelude::*;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

fn first_segment(path: &PropertyPath) -> Option<&str> {
    match path {
        PropertyPath::Whole => None,
        PropertyPath::One(k0) | PropertyPath::Two(k0, _) => Some(k0.as_str()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn write_then_clear(
        record in record_strategy(),
        path in property_path_strategy(),
        value in scalar_strategy().prop_filter("not empty", |v| *v != Value::Null),
    ) {
        let (written, cleared) = block_on(async {
            let db = TestDatabase::open().await.unwrap();
            db.seed("profiles", "p", record.clone()).await.unwrap();
            let map = DatabaseMap::new("profiles", "p").property(path.clone());

            let written = db
                .transaction(&["profiles"], TransactionMode::ReadWrite, |stores| {
                    let map = map.clone();
                    let value = value.clone();
                    async move {
                        map.persist(&stores, value, &Value::Null).await?;
                        map.read(&stores).await
                    }
                })
                .await
                .unwrap();

            db.transaction(&["profiles"], TransactionMode::ReadWrite, |stores| {
                let map = map.clone();
                async move {
                    map.persist(&stores, Value::Null, &Value::Null).await?;
                    Ok::<_, CoreError>(())
                }
            })
            .await
            .unwrap();
            let cleared = db.record("profiles", "p").await.unwrap();
            (written, cleared)
        });

        prop_assert_eq!(written, Some(value));
        prop_assert_eq!(path.read(cleared.as_ref()), None);

        match first_segment(&path) {
            None => prop_assert!(cleared.is_none()),
            Some(k0) => {
                let cleared = cleared.unwrap();
                if let Value::Map(fields) = &record {
                    for (key, original) in fields {
                        let Some(name) = key.as_text() else { continue };
                        if name != k0 {
                            prop_assert_eq!(cleared.get(name), Some(original));
                        }
                    }
                }
            }
        }
    }
}

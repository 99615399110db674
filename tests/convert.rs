use std::str::FromStr;

use columnar_loader::{data::Value, data::convert, types::ColumnType};
use num_bigint::BigInt;
use proptest::prelude::*;

fn column_type_strategy() -> impl Strategy<Value = ColumnType> {
    prop_oneof![
        Just("ascii"),
        Just("text"),
        Just("int"),
        Just("bigint"),
        Just("double"),
        Just("varint"),
        Just("decimal"),
        Just("boolean"),
        Just("timestamp"),
        Just("blob"),
        Just("uuid"),
        Just("list<int>"),
        Just("set<text>"),
        Just("map<text, int>"),
        Just("tuple<int, int>"),
    ]
    .prop_map(|name| ColumnType::from_str(name).expect("known type text"))
}

proptest! {
    #[test]
    fn blank_text_is_omitted_for_every_type(
        ty in column_type_strategy(),
        blank in "[ \t]{0,4}",
    ) {
        prop_assert_eq!(convert(&blank, &ty).unwrap(), None);
    }

    #[test]
    fn integers_round_trip_through_their_text(value in any::<i64>()) {
        let text = value.to_string();
        prop_assert_eq!(
            convert(&text, &ColumnType::BigInt).unwrap(),
            Some(Value::BigInt(value))
        );
        prop_assert_eq!(
            convert(&text, &ColumnType::Varint).unwrap(),
            Some(Value::Varint(BigInt::from(value)))
        );
    }

    #[test]
    fn varint_accepts_digit_strings_of_any_length(digits in "-?[1-9][0-9]{0,80}") {
        match convert(&digits, &ColumnType::Varint).unwrap() {
            Some(Value::Varint(parsed)) => prop_assert_eq!(parsed.to_string(), digits),
            other => prop_assert!(false, "expected varint, got {:?}", other),
        }
    }

    #[test]
    fn non_numeric_text_never_converts_to_int(text in "[a-zA-Z][a-zA-Z ]{0,8}") {
        let err = convert(&text, &ColumnType::Int).unwrap_err();
        prop_assert_eq!(err.text(), text.as_str());
        prop_assert_eq!(err.target(), &ColumnType::Int);
    }

    #[test]
    fn list_elements_keep_their_order(values in proptest::collection::vec(any::<i32>(), 1..8)) {
        let text = values.iter().map(i32::to_string).collect::<Vec<_>>().join(", ");
        let expected = values.into_iter().map(Value::Int).collect::<Vec<_>>();
        prop_assert_eq!(
            convert(&text, &ColumnType::from_str("list<int>").unwrap()).unwrap(),
            Some(Value::List(expected))
        );
    }
}

#[test]
fn unsupported_types_fail_with_the_original_text() {
    let ty = ColumnType::from_str("tuple<int, int>").unwrap();
    assert!(matches!(ty, ColumnType::Unsupported(_)));
    let err = convert("1,2", &ty).unwrap_err();
    assert_eq!(err.text(), "1,2");
}

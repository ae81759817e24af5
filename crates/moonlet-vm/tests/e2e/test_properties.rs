use super::helpers::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn integer_arithmetic_matches_host(a in -10_000i64..10_000, b in 1i64..500) {
        let src = format!("return {a} + {b}, {a} - {b}, {a} * {b}, {a} // {b}, {a} % {b}");
        let r = run_lua(&src);
        assert_num(&r, 0, (a + b) as f64);
        assert_num(&r, 1, (a - b) as f64);
        assert_num(&r, 2, (a * b) as f64);
        assert_num(&r, 3, a.div_euclid(b) as f64);
        assert_num(&r, 4, a.rem_euclid(b) as f64);
    }

    #[test]
    fn sort_agrees_with_host(mut values in proptest::collection::vec(-1000i32..1000, 0..60)) {
        let list = values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
        let src = format!("local t = {{{list}}} table.sort(t) return table.concat(t, ',')");
        values.sort();
        let expected = values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",");
        prop_assert_eq!(run_lua_strs(&src), vec![expected]);
    }

    #[test]
    fn tostring_tonumber_roundtrip(x in -1.0e12f64..1.0e12) {
        let src = format!("local x = {x:?} local y = tonumber(tostring(x)) return math.abs(y - x) <= math.abs(x) * 1e-13");
        prop_assert_eq!(run_lua_strs(&src), vec!["true".to_string()]);
    }

    #[test]
    fn plain_find_matches_host(hay in "[a-c]{0,20}", needle in "[a-c]{1,3}") {
        let src = format!("return string.find('{hay}', '{needle}', 1, true)");
        let r = run_lua_strs(&src);
        match hay.find(&needle) {
            Some(i) => {
                prop_assert_eq!(r[0].clone(), (i + 1).to_string());
                prop_assert_eq!(r[1].clone(), (i + needle.len()).to_string());
            }
            None => prop_assert_eq!(r, vec!["nil".to_string()]),
        }
    }
}

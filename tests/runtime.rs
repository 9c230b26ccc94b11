// tests/runtime.rs
// Copyright 2025 Matti Hänninen
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License. You may obtain a copy of
// the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied. See the
// License for the specific language governing permissions and limitations under
// the License.

//! End-to-end evaluation scenarios: each test boots a fresh runtime,
//! loads source, and checks the resulting value or output.

use indoc::indoc;

use pilkku::env::Env;
use pilkku::error::ErrorKind;
use pilkku::value::Value;

fn run(source: &str) -> Value {
  let env = Env::bootstrap();
  pilkku::load_string(&env, source)
    .unwrap_or_else(|e| panic!("eval failed: {}: {}", source, e))
}

fn run_err(source: &str) -> pilkku::error::Error {
  let env = Env::bootstrap();
  pilkku::load_string(&env, source)
    .err()
    .unwrap_or_else(|| panic!("expected an error from: {}", source))
}

fn int(i: i64) -> Value {
  Value::Int(i)
}

//
// Reader and printer round trips
//

#[test]
fn reader_pr_str_round_trip() {
  // S1: the printed form re-reads to an equal value.
  let result = run(indoc! {r#"
    (= (read-string (pr-str (read-string "{:a [1 2 3] :b #{:x :y}}")))
       {:a [1 2 3] :b #{:x :y}})
  "#});
  assert_eq!(result, Value::Boolean(true));
}

#[test]
fn scalar_round_trips() {
  for source in [
    "nil",
    "true",
    "42",
    "-7",
    "2.5",
    "1/3",
    "123456789012345678901234567890N",
    "1.50M",
    "\\newline",
    "\"a\\nstring\"",
    ":kw",
    ":ns/kw",
    "a-symbol",
    "(1 2 (3))",
    "[1 [2] 3]",
    "{:a 1}",
    "#{42}",
  ] {
    let check = format!(
      "(= (read-string (pr-str (quote {0}))) (quote {0}))",
      source
    );
    assert_eq!(
      run(&check),
      Value::Boolean(true),
      "round trip failed for {}",
      source
    );
  }
}

#[test]
fn equal_values_hash_alike() {
  let result = run(indoc! {r#"
    [(= (hash [1 2 3]) (hash (list 1 2 3)))
     (= (hash 1) (hash 1N))
     (= (hash {:a 1}) (hash {:a 1}))]
  "#});
  assert_eq!(
    result,
    Value::vector(vec![
      Value::Boolean(true),
      Value::Boolean(true),
      Value::Boolean(true),
    ])
  );
}

//
// Collections
//

#[test]
fn conj_pop_peek_inverse() {
  assert_eq!(
    run("(= (conj (pop (list 1 2 3)) (peek (list 1 2 3))) (list 1 2 3))"),
    Value::Boolean(true)
  );
  assert_eq!(
    run("(= (conj (pop [1 2 3]) (peek [1 2 3])) [1 2 3])"),
    Value::Boolean(true)
  );
}

#[test]
fn count_grows_by_one_under_conj() {
  assert_eq!(
    run("(= (count (conj [1 2] 9)) (inc (count [1 2])))"),
    Value::Boolean(true)
  );
  assert_eq!(
    run("(= (count (conj #{1 2} 9)) (inc (count #{1 2})))"),
    Value::Boolean(true)
  );
}

#[test]
fn assoc_get_dissoc_laws() {
  assert_eq!(run("(get (assoc {} :k 1) :k)"), int(1));
  assert_eq!(
    run("(= (dissoc (assoc {:a 1} :k 2) :k) {:a 1})"),
    Value::Boolean(true)
  );
}

#[test]
fn array_map_promotes_but_stays_equal() {
  let result = run(indoc! {r#"
    (let [small {:a 0}
          grown (reduce (fn [m i] (assoc m i i)) small (range 20))]
      [(count grown) (get grown 7) (:a grown)])
  "#});
  assert_eq!(
    result,
    Value::vector(vec![int(21), int(7), int(0)])
  );
}

#[test]
fn cons_first_rest() {
  assert_eq!(
    run("(first (cons 1 [2 3]))"),
    int(1)
  );
  assert_eq!(
    run("(= (rest (cons 1 [2 3])) (seq [2 3]))"),
    Value::Boolean(true)
  );
}

//
// Laziness
//

#[test]
fn lazy_seqs_realize_once() {
  let result = run(indoc! {r#"
    (def a (atom 0))
    (def l (map (fn [x] (swap! a inc) x) [1 2 3]))
    (doall l)
    (doall l)
    (deref a)
  "#});
  assert_eq!(result, int(3));
}

#[test]
fn seq_of_realized_lazy_seq_is_identical() {
  assert_eq!(
    run("(let [l (map inc [1 2 3])] (identical? (seq l) (seq l)))"),
    Value::Boolean(true)
  );
}

#[test]
fn transduce_early_exits_on_infinite_range() {
  // S2: take must stop the fold via reduced.
  assert_eq!(
    run("(transduce (comp (map inc) (filter odd?) (take 3)) + 0 (range))"),
    int(9)
  );
}

#[test]
fn sequence_with_a_transducer_is_incremental() {
  assert_eq!(
    run("(= [0 2 4] (vec (take 3 (sequence (map (fn [x] (* 2 x))) (range)))))"),
    Value::Boolean(true)
  );
}

#[test]
fn into_accepts_transducers() {
  assert_eq!(
    run("(= [1 3 5] (into [] (filter odd?) (range 6)))"),
    Value::Boolean(true)
  );
}

//
// doseq
//

#[test]
fn doseq_with_when_over_range() {
  // S3
  let result = run(indoc! {r#"
    (let [a (atom [])]
      (doseq [i (range 10) :when (even? i)] (swap! a conj i))
      (deref a))
  "#});
  assert_eq!(
    result,
    Value::vector(vec![int(0), int(2), int(4), int(6), int(8)])
  );
}

#[test]
fn doseq_walks_chunked_vectors() {
  let result = run(indoc! {r#"
    (let [a (atom 0)]
      (doseq [i (vec (range 100))] (swap! a + i))
      (deref a))
  "#});
  assert_eq!(result, int(4950));
}

#[test]
fn doseq_while_stops_and_nests() {
  let result = run(indoc! {r#"
    (let [a (atom [])]
      (doseq [i [1 2 3] :while (< i 3)
              j [10 20] :let [x (* i j)]]
        (swap! a conj x))
      (deref a))
  "#});
  assert_eq!(
    result,
    Value::vector(vec![int(10), int(20), int(20), int(40)])
  );
}

//
// case
//

#[test]
fn case_over_strings_verifies_equality() {
  // S4: hash buckets always re-check the candidate.
  let result = run(indoc! {r#"
    (defn c [x] (case x "foo" 1 "bar" 2 "baz" 3 :else))
    [(c "foo") (c "bar") (c "baz") (c "qux")]
  "#});
  assert_eq!(
    result,
    Value::vector(vec![int(1), int(2), int(3), Value::kw("else")])
  );
}

#[test]
fn case_dispatches_ints_keywords_and_lists() {
  assert_eq!(run("(case 3 1 :a 3 :c :d)"), Value::kw("c"));
  assert_eq!(run("(case :k :j 1 :k 2 0)"), int(2));
  assert_eq!(run("(case 5 (4 5 6) :mid :out)"), Value::kw("mid"));
  assert_eq!(run("(case 'sym sym :s :other)"), Value::kw("s"));
}

#[test]
fn case_without_matching_clause_or_default_fails() {
  let e = run_err("(case 9 1 :a)");
  assert_eq!(e.kind, ErrorKind::Lookup);
}

//
// Dynamic binding
//

#[test]
fn binding_restores_after_throw() {
  // S5
  let result = run(indoc! {r#"
    (def ^:dynamic *x* :root)
    (try
      (binding [*x* :inner] (throw (ex-info "boom" {})))
      (catch Exception _ *x*))
  "#});
  assert_eq!(result, Value::kw("root"));
}

#[test]
fn set_bang_mutates_only_the_binding_frame() {
  let result = run(indoc! {r#"
    (def ^:dynamic *x* 0)
    [(binding [*x* 1] (set! *x* 2) *x*) *x*]
  "#});
  assert_eq!(result, Value::vector(vec![int(2), int(0)]));
}

#[test]
fn with_redefs_restores_roots() {
  let result = run(indoc! {r#"
    (defn f [] :original)
    [(with-redefs [f (fn [] :redefined)] (f)) (f)]
  "#});
  assert_eq!(
    result,
    Value::vector(vec![
      Value::kw("redefined"),
      Value::kw("original"),
    ])
  );
}

#[test]
fn bound_fn_star_snapshots_bindings() {
  let result = run(indoc! {r#"
    (def ^:dynamic *x* :root)
    (def captured
      (binding [*x* :snapshot] (bound-fn* (fn [] *x*))))
    (captured)
  "#});
  assert_eq!(result, Value::kw("snapshot"));
}

//
// Errors
//

#[test]
fn ex_info_carries_message_data_and_cause() {
  let result = run(indoc! {r#"
    (try
      (throw (ex-info "boom" {:code 7}))
      (catch Exception e
        [(ex-message e) (:code (ex-data e))]))
  "#});
  assert_eq!(
    result,
    Value::vector(vec![Value::string("boom"), int(7)])
  );
}

#[test]
fn divide_by_zero_is_arithmetic() {
  assert_eq!(run_err("(/ 1 0)").kind, ErrorKind::Arithmetic);
  assert_eq!(run("(/ 1.0 0.0)"), Value::Float(f64::INFINITY));
}

#[test]
fn unprimed_overflow_errors_and_primed_promotes() {
  assert_eq!(
    run_err("(inc 9223372036854775807)").kind,
    ErrorKind::Arithmetic
  );
  assert_eq!(
    run("(integer? (inc' 9223372036854775807))"),
    Value::Boolean(true)
  );
}

#[test]
fn assertion_errors_are_caught_by_error_not_exception() {
  let result = run(indoc! {r#"
    (try (assert false "nope")
         (catch Exception _ :wrong)
         (catch Error _ :caught))
  "#});
  assert_eq!(result, Value::kw("caught"));
}

#[test]
fn finally_runs_on_every_path() {
  let result = run(indoc! {r#"
    (def log (atom []))
    (try (swap! log conj :body) :value
         (finally (swap! log conj :finally)))
    (try (throw (ex-info "x" {})) (catch Exception _ nil)
         (finally (swap! log conj :finally-2)))
    (deref log)
  "#});
  assert_eq!(
    result,
    Value::vector(vec![
      Value::kw("body"),
      Value::kw("finally"),
      Value::kw("finally-2"),
    ])
  );
}

//
// recur and stack behavior
//

#[test]
fn loop_recur_runs_in_constant_stack() {
  assert_eq!(
    run("(loop [i 0] (if (< i 1000000) (recur (inc i)) i))"),
    int(1000000)
  );
}

#[test]
fn fn_recur_handles_variadic_targets() {
  let result = run(indoc! {r#"
    ((fn [acc & xs]
       (if xs
         (recur (+ acc (first xs)) (next xs))
         acc))
     0 1 2 3 4)
  "#});
  assert_eq!(result, int(10));
}

#[test]
fn mutual_recursion_survives_ten_thousand_frames() {
  // S8: not tail position, so this exercises real recursion depth.
  let handle = std::thread::Builder::new()
    .stack_size(256 * 1024 * 1024)
    .spawn(|| {
      run(indoc! {r#"
        (letfn [(e? [n] (if (zero? n) true (o? (dec n))))
                (o? [n] (if (zero? n) false (e? (dec n))))]
          (e? 10000))
      "#})
    })
    .expect("spawn test thread");
  assert_eq!(handle.join().unwrap(), Value::Boolean(true));
}

//
// Macros
//

#[test]
fn user_macros_expand_through_syntax_quote() {
  let result = run(indoc! {r#"
    (defmacro unless [test then else]
      `(if ~test ~else ~then))
    (unless false :yes :no)
  "#});
  assert_eq!(result, Value::kw("yes"));
}

#[test]
fn auto_gensyms_are_hygienic() {
  let result = run(indoc! {r#"
    (defmacro twice [expr]
      `(let [v# ~expr] [v# v#]))
    (let [v 1] (twice (inc v)))
  "#});
  assert_eq!(result, Value::vector(vec![int(2), int(2)]));
}

#[test]
fn runaway_expansion_is_reported() {
  let e = run_err("(defmacro loopy [] '(loopy)) (loopy)");
  assert_eq!(e.kind, ErrorKind::ExpansionDepth);
}

#[test]
fn threading_and_friends() {
  assert_eq!(run("(-> 1 inc (+ 3))"), int(5));
  assert_eq!(run("(->> [1 2 3] (map inc) (reduce +))"), int(9));
  assert_eq!(run("(as-> 1 x (+ x 1) (* x 10))"), int(20));
  assert_eq!(run("(cond-> 1 true inc false (* 100))"), int(2));
  assert_eq!(run("(some-> {:a 1} :a inc)"), int(2));
  assert_eq!(run("(some-> {:a 1} :b inc)"), Value::Nil);
}

#[test]
fn condp_supports_ternary_clauses() {
  let result = run(indoc! {r#"
    [(condp = 3 1 :one 3 :three :other)
     (condp get :k #{:a} :>> (fn [m] [:hit m]) #{:k} :>> (fn [m] [:found m]) :miss)]
  "#});
  assert_eq!(
    result,
    Value::vector(vec![
      Value::kw("three"),
      Value::vector(vec![
        Value::kw("found"),
        Value::kw("k"),
      ]),
    ])
  );
}

#[test]
fn destructuring_in_let_and_fn() {
  assert_eq!(
    run("(let [[a b & r :as all] [1 2 3 4]] [a b (vec r) (count all)])"),
    Value::vector(vec![
      int(1),
      int(2),
      Value::vector(vec![int(3), int(4)]),
      int(4),
    ])
  );
  assert_eq!(
    run("(let [{:keys [x y] :or {y 7}} {:x 1}] [x y])"),
    Value::vector(vec![int(1), int(7)])
  );
  assert_eq!(
    run("((fn [[a b]] (+ a b)) [40 2])"),
    int(42)
  );
}

#[test]
fn defonce_and_declare() {
  let result = run(indoc! {r#"
    (declare later)
    (defn earlier [] (later))
    (defn later [] :ok)
    (defonce x 1)
    (defonce x 2)
    [(earlier) x]
  "#});
  assert_eq!(
    result,
    Value::vector(vec![Value::kw("ok"), int(1)])
  );
}

#[test]
fn delay_is_forced_once_and_cached() {
  let result = run(indoc! {r#"
    (def a (atom 0))
    (def d (delay (swap! a inc) :value))
    [(realized? d) (deref d) (deref d) (deref a) (realized? d)]
  "#});
  assert_eq!(
    result,
    Value::vector(vec![
      Value::Boolean(false),
      Value::kw("value"),
      Value::kw("value"),
      int(1),
      Value::Boolean(true),
    ])
  );
}

#[test]
fn with_open_closes_on_throw() {
  let result = run(indoc! {r#"
    (def closed (atom []))
    (def r (reify Closeable (close [this] (swap! closed conj :closed))))
    (try
      (with-open [h r] (throw (ex-info "x" {})))
      (catch Exception _ nil))
    (deref closed)
  "#});
  assert_eq!(
    result,
    Value::vector(vec![Value::kw("closed")])
  );
}

//
// Protocols and multimethods
//

#[test]
fn multimethods_dispatch_and_default() {
  let result = run(indoc! {r#"
    (defmulti speak :kind)
    (defmethod speak :dog [_] "woof")
    (defmethod speak :default [_] "...")
    [(speak {:kind :dog}) (speak {:kind :fish})]
  "#});
  assert_eq!(
    result,
    Value::vector(vec![
      Value::string("woof"),
      Value::string("..."),
    ])
  );
}

#[test]
fn extend_protocol_dispatches_on_concrete_type() {
  let result = run(indoc! {r#"
    (defprotocol Sized (size-of [x]))
    (extend-protocol Sized
      String (size-of [x] (.length x))
      PersistentVector (size-of [x] (count x))
      nil (size-of [x] 0))
    [(size-of "abc") (size-of [1 2]) (size-of nil)]
  "#});
  assert_eq!(
    result,
    Value::vector(vec![int(3), int(2), int(0)])
  );
}

//
// Namespaces
//

#[test]
fn ns_switching_and_qualified_access() {
  let result = run(indoc! {r#"
    (ns scratch.alpha)
    (def shared 41)
    (ns user)
    (inc scratch.alpha/shared)
  "#});
  assert_eq!(result, int(42));
}

#[test]
fn aliases_resolve_through_require() {
  let result = run(indoc! {r#"
    (ns scratch.beta)
    (def x 7)
    (ns user (:require [scratch.beta :as b]))
    b/x
  "#});
  assert_eq!(result, int(7));
}

#[test]
fn vars_resolve_and_report_bound() {
  let result = run(indoc! {r#"
    (def known 1)
    [(var? (var known)) (bound? (var known)) (some? (resolve 'known))]
  "#});
  assert_eq!(
    result,
    Value::vector(vec![
      Value::Boolean(true),
      Value::Boolean(true),
      Value::Boolean(true),
    ])
  );
}

//
// Printing and pprint
//

#[test]
fn with_out_str_captures_output() {
  assert_eq!(
    run("(with-out-str (print \"a\") (print \"b\"))"),
    Value::string("ab")
  );
  assert_eq!(
    run("(with-out-str (prn :k))"),
    Value::string(":k\n")
  );
}

#[test]
fn pprint_wraps_at_the_right_margin() {
  // S6
  let result = run(indoc! {r#"
    (binding [*print-right-margin* 20]
      (with-out-str (pprint [1 2 3 4 5 6 7 8 9 10])))
  "#});
  let Value::Str(text) = result else {
    panic!("expected a string");
  };
  assert!(text.contains('\n'), "expected a wrapped line: {:?}", text);
  let normalized: String = text
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ");
  assert_eq!(normalized, "[1 2 3 4 5 6 7 8 9 10]");
}

#[test]
fn pprint_fits_short_values_on_one_line() {
  let result =
    run("(with-out-str (pprint {:a 1}))");
  assert_eq!(result, Value::string("{:a 1}\n"));
}

#[test]
fn cl_format_directives() {
  // S7
  assert_eq!(
    run("(cl-format nil \"~:D\" 1234567)"),
    Value::string("1,234,567")
  );
  assert_eq!(
    run("(cl-format nil \"~16R\" 255)"),
    Value::string("ff")
  );
  assert_eq!(
    run("(cl-format nil \"~A-~S\" \"x\" \"x\")"),
    Value::string("x-\"x\"")
  );
  assert_eq!(
    run("(cl-format nil \"~{~A~^, ~}\" [1 2 3])"),
    Value::string("1, 2, 3")
  );
  assert_eq!(
    run("(cl-format nil \"~D file~:P\" 1)"),
    Value::string("1 file")
  );
}

#[test]
fn cl_format_true_writes_to_out() {
  assert_eq!(
    run("(with-out-str (cl-format true \"~A!\" :hi))"),
    Value::string(":hi!")
  );
}

//
// Numeric tower
//

#[test]
fn quot_rem_reconstruct_the_dividend() {
  let result = run(indoc! {r#"
    (every? (fn [[i j]]
              (= i (+ (* (quot i j) j) (rem i j))))
            [[7 2] [-7 2] [7 -2] [-7 -2] [9 3]])
  "#});
  assert_eq!(result, Value::Boolean(true));
}

#[test]
fn ratios_and_promotion() {
  assert_eq!(run("(+ 1/3 2/3)"), run("1N"));
  assert_eq!(
    run("(ratio? (/ 1 3))"),
    Value::Boolean(true)
  );
  assert_eq!(run("(* 1/2 4)"), run("2N"));
  assert_eq!(run("(+ 1 2.5)"), Value::Float(3.5));
  assert_eq!(
    run("(decimal? (+ 1M 1))"),
    Value::Boolean(true)
  );
}

#[test]
fn numeric_equality_is_category_aware() {
  assert_eq!(run("(= 1 1N)"), Value::Boolean(true));
  assert_eq!(run("(= 1 1.0)"), Value::Boolean(false));
  assert_eq!(run("(== 1 1.0)"), Value::Boolean(true));
  assert_eq!(run("(= ##NaN ##NaN)"), Value::Boolean(false));
}

//
// Interop surface
//

#[test]
fn string_methods_and_builders() {
  assert_eq!(run("(.length \"hello\")"), int(5));
  assert_eq!(
    run("(.toUpperCase \"abc\")"),
    Value::string("ABC")
  );
  assert_eq!(
    run("(.substring \"hello\" 1 3)"),
    Value::string("el")
  );
  assert_eq!(
    run(indoc! {r#"
      (let [sb (StringBuilder. "a")]
        (.append sb "b")
        (.append sb \c)
        (.toString sb))
    "#}),
    Value::string("abc")
  );
}

#[test]
fn instance_checks_cover_the_core_types() {
  assert_eq!(
    run("[(instance? String \"s\") (instance? Long 1) (instance? Keyword :k)]"),
    Value::vector(vec![
      Value::Boolean(true),
      Value::Boolean(true),
      Value::Boolean(true),
    ])
  );
}

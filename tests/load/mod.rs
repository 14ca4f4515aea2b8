mod stress_test;
mod support;

mod helpers;
mod test_errors;
mod test_expressions;
mod test_functions;
mod test_lua_samples;
mod test_programs;
mod test_statements;

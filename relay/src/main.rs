fn main() {
    relay::main();
}
